//! 健康检查
//!
//! `HealthMonitor` 按 `health_check_interval` 周期调用
//! [`ConnectionPool::run_health_check`]：回收空闲过久的连接，探测其余空闲连接，
//! 关闭探测失败的连接并补足 `min_connections`。连接各自探测完成后立即放回，
//! 探测期间只有该连接本身不可借出。

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rat_logger::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::manager::ConnectionManager;
use super::metrics::{HealthCheckOutcome, HealthReport, HealthStatus};
use super::pool::{ConnectionPool, PoolShared};
use super::types::ManagedConnection;
use crate::error::{QuickPoolError, QuickPoolResult};

/// 后台健康检查任务
///
/// 只持有连接池的弱引用，连接池被释放后任务自行退出
pub struct HealthMonitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    pub fn start<M: ConnectionManager>(pool: &ConnectionPool<M>) -> Self {
        let cancel = CancellationToken::new();
        let period = pool.shared.config.health_check_interval;
        let weak: Weak<PoolShared<M>> = Arc::downgrade(&pool.shared);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("健康检查任务启动: 间隔={:?}", period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(shared) = weak.upgrade() else { break };
                        let pool = ConnectionPool { shared };
                        if pool.is_closed() {
                            break;
                        }
                        let outcome = pool.run_health_check().await;
                        if outcome.failed > 0 || outcome.evicted > 0 {
                            info!(
                                "健康检查完成: 探测={}, 失败={}, 回收={}, 补充={}",
                                outcome.probed, outcome.failed, outcome.evicted, outcome.replaced
                            );
                        }
                    }
                }
            }
            debug!("健康检查任务退出");
        });

        Self { cancel, handle }
    }

    /// 停止任务并等待其退出
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                error!("健康检查任务异常退出: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    /// 执行一次健康检查
    pub async fn run_health_check(&self) -> HealthCheckOutcome {
        let shared = &self.shared;
        let config = &shared.config;
        let mut outcome = HealthCheckOutcome::default();

        // 取出全部空闲连接：超时的回收，其余进入探测
        let (evicted, candidates) = {
            let mut state = shared.state.lock();
            if state.closed {
                return outcome;
            }
            let mut idle: Vec<ManagedConnection<M::Connection>> = state.idle.drain(..).collect();
            // 最久未使用的优先回收
            idle.sort_by_key(|conn| conn.last_used_at);

            let mut evicted = Vec::new();
            let mut candidates = Vec::new();
            for conn in idle {
                if state.total > config.min_connections && conn.idle_for() > config.max_idle_time {
                    state.total -= 1;
                    evicted.push(conn);
                } else {
                    candidates.push(conn);
                }
            }
            state.probing += candidates.len() as u32;
            (evicted, candidates)
        };

        outcome.evicted = evicted.len();
        if !evicted.is_empty() {
            debug!("回收 {} 个空闲超时的连接", evicted.len());
            shared.metrics.record_evicted(evicted.len() as u64);
            shared
                .close_all(evicted.into_iter().map(|c| c.native).collect(), "idle-expired")
                .await;
        }

        outcome.probed = candidates.len();
        let mut probes: FuturesUnordered<_> = candidates
            .into_iter()
            .map(|conn| probe(shared.clone(), conn, config.health_check_timeout))
            .collect();

        let mut failed = Vec::new();
        while let Some((mut conn, result)) = probes.next().await {
            let mut state = shared.state.lock();
            state.probing = state.probing.saturating_sub(1);
            match result {
                Ok(()) if !state.closed => state.put_back(conn),
                Ok(()) => {
                    state.release_slot();
                    failed.push(conn);
                }
                Err(e) => {
                    warn!("连接探测失败: id={}, 错误={}", conn.id, e);
                    conn.healthy = false;
                    outcome.failed += 1;
                    state.release_slot();
                    failed.push(conn);
                }
            }
            shared.notify_if_drained(&state);
        }
        shared.metrics.record_health_failures(outcome.failed as u64);
        let reason = if outcome.failed > 0 { "unhealthy" } else { "shutdown" };
        shared
            .close_all(failed.into_iter().map(|c| c.native).collect(), reason)
            .await;

        outcome.replaced = self.replenish().await;
        outcome
    }

    /// 补足最小连接数，返回新建的连接数
    async fn replenish(&self) -> usize {
        let shared = &self.shared;
        let deficit = {
            let mut state = shared.state.lock();
            if state.closed || state.total >= shared.config.min_connections {
                return 0;
            }
            let deficit = shared.config.min_connections - state.total;
            state.total += deficit;
            deficit
        };

        let mut replaced = 0;
        let mut remaining = deficit;
        while remaining > 0 {
            match shared.manager.connect().await {
                Ok(native) => {
                    remaining -= 1;
                    let conn = ManagedConnection::new(shared.next_connection_id(), native);
                    shared.metrics.record_created();
                    let mut state = shared.state.lock();
                    if state.closed {
                        state.total = state.total.saturating_sub(1);
                        shared.notify_if_drained(&state);
                        drop(state);
                        shared.spawn_close(vec![conn.native], "shutdown");
                    } else {
                        state.put_back(conn);
                        replaced += 1;
                    }
                }
                Err(e) => {
                    error!("补充连接失败: {}", e);
                    break;
                }
            }
        }

        if remaining > 0 {
            let mut state = shared.state.lock();
            for _ in 0..remaining {
                state.release_slot();
            }
            shared.notify_if_drained(&state);
        }
        replaced
    }

    /// 生成健康报告
    ///
    /// 借一个连接做一次存活探测，结合最近一次周期检查的结果判定状态
    pub async fn health(&self) -> HealthReport {
        let database_type = self.database_type().as_str().to_string();
        let started = Instant::now();

        let (mut status, probe_failed) = if self.is_closed() {
            (HealthStatus::Unhealthy, false)
        } else {
            match self.acquire_timeout(self.shared.config.health_check_timeout).await {
                Ok(mut conn) => {
                    let ping = tokio::time::timeout(
                        self.shared.config.health_check_timeout,
                        self.shared.manager.ping(&mut conn),
                    )
                    .await;
                    match ping {
                        Ok(Ok(())) => (HealthStatus::Healthy, false),
                        Ok(Err(e)) => {
                            warn!("健康探测失败: {}", e);
                            conn.mark_unhealthy();
                            (HealthStatus::Unhealthy, true)
                        }
                        Err(_) => {
                            warn!("健康探测超时");
                            conn.mark_unhealthy();
                            (HealthStatus::Unhealthy, true)
                        }
                    }
                }
                Err(QuickPoolError::PoolExhausted { .. }) => (HealthStatus::Degraded, false),
                Err(e) => {
                    warn!("健康探测无法获取连接: {}", e);
                    (HealthStatus::Unhealthy, true)
                }
            }
        };
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let last_tick_failures = self.shared.metrics.last_tick_failures() as u32;
        let pool_status = self.status();
        if status == HealthStatus::Healthy
            && (last_tick_failures > 0 || pool_status.active >= self.shared.config.max_connections)
        {
            status = HealthStatus::Degraded;
        }

        HealthReport {
            status,
            total_connections: pool_status.total,
            healthy_connections: pool_status.active + pool_status.idle,
            failed_connections: last_tick_failures + u32::from(probe_failed),
            database_type,
            response_time_ms,
        }
    }
}

async fn probe<M: ConnectionManager>(
    shared: Arc<PoolShared<M>>,
    mut conn: ManagedConnection<M::Connection>,
    timeout: Duration,
) -> (ManagedConnection<M::Connection>, QuickPoolResult<()>) {
    let result = match tokio::time::timeout(timeout, shared.manager.ping(&mut conn.native)).await {
        Ok(result) => result,
        Err(_) => Err(crate::quick_error!(
            health,
            format!("探测超时: {:?}", timeout)
        )),
    };
    (conn, result)
}
