//! 集成测试共用的假连接管理器
//!
//! 不访问任何数据库，计时类测试可以在暂停的时钟下运行

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rat_quickpool::{
    ConnectionManager, ConnectionPool, DatabaseType, PoolConfig, QuickPoolError, QuickPoolResult,
};

#[derive(Debug)]
pub struct FakeConn {
    pub serial: u32,
    /// 为 true 时下一次存活探测失败
    pub fail_probe: bool,
    /// 存活探测前的等待时间
    pub ping_delay: Duration,
}

#[derive(Clone, Default)]
pub struct FakeManager {
    connects: Arc<AtomicU32>,
    closes: Arc<AtomicU32>,
    fail_connect: Arc<AtomicBool>,
    connect_delay_ms: Arc<AtomicU64>,
}

impl FakeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 累计建立的连接数
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// 累计关闭的连接数
    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// 之后每次建连前先等待 `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionManager for FakeManager {
    type Connection = FakeConn;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn connect(&self) -> QuickPoolResult<FakeConn> {
        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(QuickPoolError::ConnectionCreationFailed {
                message: "后端不可达".to_string(),
                source: None,
            });
        }
        let serial = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakeConn {
            serial,
            fail_probe: false,
            ping_delay: Duration::ZERO,
        })
    }

    async fn ping(&self, conn: &mut FakeConn) -> QuickPoolResult<()> {
        if !conn.ping_delay.is_zero() {
            tokio::time::sleep(conn.ping_delay).await;
        }
        if conn.fail_probe {
            Err(QuickPoolError::HealthCheckFailed {
                message: format!("连接 {} 探测失败", conn.serial),
            })
        } else {
            Ok(())
        }
    }

    async fn close(&self, _conn: FakeConn) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// 测试用连接池配置；健康检查间隔很长，由测试手动触发
pub fn pool_config(min: u32, max: u32) -> PoolConfig {
    PoolConfig {
        min_connections: min,
        max_connections: max,
        max_idle_time: Duration::from_secs(60),
        acquire_timeout: Duration::from_secs(1),
        health_check_interval: Duration::from_secs(3600),
        health_check_timeout: Duration::from_secs(1),
        metrics_enabled: true,
    }
}

pub async fn fake_pool(min: u32, max: u32) -> (FakeManager, ConnectionPool<FakeManager>) {
    let manager = FakeManager::new();
    let pool = ConnectionPool::new(manager.clone(), pool_config(min, max))
        .await
        .unwrap();
    (manager, pool)
}
