//! 连接池模块
//!
//! 通用连接池 [`ConnectionPool`] 加上 SQLite 与 PostgreSQL 两种连接管理器。
//! [`Pool`] 抹平后端差异，供仓储层和多库管理器以 `Arc<dyn Pool>` 使用。

pub mod health;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod postgres_manager;
pub mod sqlite_manager;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rat_logger::info;

pub use health::HealthMonitor;
pub use manager::ConnectionManager;
pub use metrics::{HealthCheckOutcome, HealthReport, HealthStatus, PoolMetrics, PoolMetricsReport};
pub use pool::{ConnectionPool, PoolStatus};
pub use postgres_manager::PostgresManager;
pub use sqlite_manager::SqliteManager;
pub use types::{ConnectionId, DatabaseConnection, ManagedConnection, PooledConnection};

use crate::error::QuickPoolResult;
use crate::types::{DatabaseConfig, DatabaseType, PoolConfig};

pub type SqlitePool = ConnectionPool<SqliteManager>;
pub type PostgresPool = ConnectionPool<PostgresManager>;

/// 后端无关的连接池接口
#[async_trait]
pub trait Pool: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    fn config(&self) -> &PoolConfig;

    /// 获取连接，最多等待 `acquire_timeout`
    async fn acquire(&self) -> QuickPoolResult<PooledConnection<DatabaseConnection>>;

    /// 获取连接，最多等待 `timeout`
    async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> QuickPoolResult<PooledConnection<DatabaseConnection>>;

    fn release(&self, conn: PooledConnection<DatabaseConnection>) -> QuickPoolResult<()>;

    fn metrics(&self) -> PoolMetricsReport;

    fn status(&self) -> PoolStatus;

    async fn health(&self) -> HealthReport;

    async fn run_health_check(&self) -> HealthCheckOutcome;

    async fn shutdown(&self);

    fn is_closed(&self) -> bool;
}

#[async_trait]
impl<M> Pool for ConnectionPool<M>
where
    M: ConnectionManager<Connection = DatabaseConnection>,
{
    fn database_type(&self) -> DatabaseType {
        ConnectionPool::database_type(self)
    }

    fn config(&self) -> &PoolConfig {
        ConnectionPool::config(self)
    }

    async fn acquire(&self) -> QuickPoolResult<PooledConnection<DatabaseConnection>> {
        ConnectionPool::acquire(self).await
    }

    async fn acquire_timeout(
        &self,
        timeout: Duration,
    ) -> QuickPoolResult<PooledConnection<DatabaseConnection>> {
        ConnectionPool::acquire_timeout(self, timeout).await
    }

    fn release(&self, conn: PooledConnection<DatabaseConnection>) -> QuickPoolResult<()> {
        ConnectionPool::release(self, conn)
    }

    fn metrics(&self) -> PoolMetricsReport {
        ConnectionPool::metrics(self)
    }

    fn status(&self) -> PoolStatus {
        ConnectionPool::status(self)
    }

    async fn health(&self) -> HealthReport {
        ConnectionPool::health(self).await
    }

    async fn run_health_check(&self) -> HealthCheckOutcome {
        ConnectionPool::run_health_check(self).await
    }

    async fn shutdown(&self) {
        ConnectionPool::shutdown(self).await
    }

    fn is_closed(&self) -> bool {
        ConnectionPool::is_closed(self)
    }
}

/// 按数据库配置创建连接池
pub async fn create_pool(config: &DatabaseConfig) -> QuickPoolResult<Arc<dyn Pool>> {
    config.validate()?;
    info!(
        "创建数据库连接池: 别名={}, 类型={}",
        config.alias, config.db_type
    );
    let pool: Arc<dyn Pool> = match config.db_type {
        DatabaseType::SQLite => {
            let manager = SqliteManager::new(config)?;
            Arc::new(ConnectionPool::new(manager, config.pool.clone()).await?)
        }
        DatabaseType::PostgreSQL => {
            let manager = PostgresManager::new(config)?;
            Arc::new(ConnectionPool::new(manager, config.pool.clone()).await?)
        }
    };
    Ok(pool)
}
