//! 连接管理策略
//!
//! 连接池只负责借还、容量和健康状态；如何建立、探测和关闭一个原生连接
//! 由 `ConnectionManager` 决定。SQLite 与 PostgreSQL 各有一个实现。

use async_trait::async_trait;

use crate::error::QuickPoolResult;
use crate::types::DatabaseType;

#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    /// 原生连接类型
    type Connection: Send + 'static;

    /// 后端类型，用于指标与健康报告
    fn database_type(&self) -> DatabaseType;

    /// 建立一个新连接，失败时返回 `ConnectionCreationFailed`
    async fn connect(&self) -> QuickPoolResult<Self::Connection>;

    /// 存活探测，失败时返回 `HealthCheckFailed`
    async fn ping(&self, conn: &mut Self::Connection) -> QuickPoolResult<()>;

    /// 关闭连接
    async fn close(&self, conn: Self::Connection);
}
