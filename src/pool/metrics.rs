//! 连接池运行指标与健康报告

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 获取耗时的指数加权系数
const ACQUIRE_EWMA_ALPHA: f64 = 0.2;

/// 连接池运行指标
///
/// 计数器只由所属连接池修改；`metrics_enabled` 为 false 时计数器保持为零，
/// 活跃/空闲等瞬时量仍然可读。
#[derive(Debug)]
pub struct PoolMetrics {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    health_failures: AtomicU64,
    created_total: AtomicU64,
    closed_total: AtomicU64,
    evicted_total: AtomicU64,
    connection_timeouts: AtomicU64,
    peak_connections_used: AtomicU64,
    /// 最近一次健康检查淘汰的连接数，用于健康状态判定，始终记录
    last_tick_failures: AtomicU64,
    /// 平均获取耗时（毫秒）
    average_acquire_ms: Mutex<Option<f64>>,
}

impl PoolMetrics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            health_failures: AtomicU64::new(0),
            created_total: AtomicU64::new(0),
            closed_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
            connection_timeouts: AtomicU64::new(0),
            peak_connections_used: AtomicU64::new(0),
            last_tick_failures: AtomicU64::new(0),
            average_acquire_ms: Mutex::new(None),
        }
    }

    fn bump(&self, counter: &AtomicU64, n: u64) {
        if self.enabled && n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_hit(&self) {
        self.bump(&self.hits, 1);
    }

    pub(crate) fn record_miss(&self) {
        self.bump(&self.misses, 1);
    }

    pub(crate) fn record_created(&self) {
        self.bump(&self.created_total, 1);
    }

    pub(crate) fn record_closed(&self, n: u64) {
        self.bump(&self.closed_total, n);
    }

    pub(crate) fn record_evicted(&self, n: u64) {
        self.bump(&self.evicted_total, n);
    }

    pub(crate) fn record_timeout(&self) {
        self.bump(&self.connection_timeouts, 1);
    }

    pub(crate) fn record_health_failures(&self, n: u64) {
        self.last_tick_failures.store(n, Ordering::Relaxed);
        self.bump(&self.health_failures, n);
    }

    /// 记录当前借出数量，更新峰值
    pub(crate) fn observe_in_use(&self, in_use: usize) {
        if self.enabled {
            self.peak_connections_used
                .fetch_max(in_use as u64, Ordering::Relaxed);
        }
    }

    /// 以指数加权方式记录一次获取耗时
    pub(crate) fn record_acquire(&self, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        let sample = elapsed.as_secs_f64() * 1000.0;
        let mut avg = self.average_acquire_ms.lock();
        *avg = Some(match *avg {
            Some(prev) => prev + ACQUIRE_EWMA_ALPHA * (sample - prev),
            None => sample,
        });
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn health_failures(&self) -> u64 {
        self.health_failures.load(Ordering::Relaxed)
    }

    pub fn last_tick_failures(&self) -> u64 {
        self.last_tick_failures.load(Ordering::Relaxed)
    }

    /// 命中率 = hits / (hits + misses)，没有获取记录时为 0
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn average_acquire_ms(&self) -> f64 {
        let avg = *self.average_acquire_ms.lock();
        avg.unwrap_or(0.0)
    }

    /// 生成指标报告，瞬时量由连接池传入
    pub(crate) fn report(&self, pool_type: &str, gauges: PoolGauges) -> PoolMetricsReport {
        PoolMetricsReport {
            pool_type: pool_type.to_string(),
            active_connections: gauges.active,
            idle_connections: gauges.idle,
            total_connections: gauges.total,
            hit_rate: self.hit_rate(),
            hit_count: self.hits(),
            miss_count: self.misses(),
            health_failures: self.health_failures(),
            average_connection_time_ms: self.average_acquire_ms(),
            peak_connections_used: self.peak_connections_used.load(Ordering::Relaxed),
            connection_timeouts: self.connection_timeouts.load(Ordering::Relaxed),
            created_total: self.created_total.load(Ordering::Relaxed),
            closed_total: self.closed_total.load(Ordering::Relaxed),
            evicted_total: self.evicted_total.load(Ordering::Relaxed),
        }
    }
}

/// 连接池瞬时量
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PoolGauges {
    pub active: u32,
    pub idle: u32,
    pub total: u32,
}

/// 指标报告，供外部监控采集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolMetricsReport {
    /// 后端类型标识
    pub pool_type: String,
    pub active_connections: u32,
    pub idle_connections: u32,
    /// 池持有的全部连接（空闲、借出、探测中以及正在建立的）
    pub total_connections: u32,
    /// 0.0 - 1.0
    pub hit_rate: f64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub health_failures: u64,
    /// 获取连接耗时的指数加权平均（毫秒）
    pub average_connection_time_ms: f64,
    pub peak_connections_used: u64,
    pub connection_timeouts: u64,
    pub created_total: u64,
    pub closed_total: u64,
    pub evicted_total: u64,
}

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// 健康报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub total_connections: u32,
    /// 池中未被判定为失效的连接
    pub healthy_connections: u32,
    /// 最近一次健康检查淘汰的连接数，加上本次探测失败的连接
    pub failed_connections: u32,
    pub database_type: String,
    /// 本次探测往返耗时（毫秒）
    pub response_time_ms: f64,
}

/// 单次健康检查的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCheckOutcome {
    /// 参与探测的空闲连接数
    pub probed: usize,
    /// 探测失败并被关闭的连接数
    pub failed: usize,
    /// 因空闲超时被回收的连接数
    pub evicted: usize,
    /// 为补足最小连接数新建的连接数
    pub replaced: usize,
}
