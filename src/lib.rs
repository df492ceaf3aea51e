//! rat_quickpool - 异步数据库连接池与批量访问层
//!
//! 为SQLite和PostgreSQL提供有界连接池、后台健康检查、运行指标，
//! 以及在单个借出连接上以事务方式执行的批量操作和关联预取

// 条件编译调试宏 - 只有在 debug 模式下才输出调试信息
#[cfg(debug_assertions)]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        rat_logger::debug!($($arg)*);
    };
}

#[cfg(not(debug_assertions))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        // 在 release 模式下不输出调试信息
    };
}

// 导出所有公共模块
pub mod error;
pub mod types;
pub mod config;
pub mod pool;
pub mod security;
pub mod model;
pub mod adapter;
pub mod batch;
pub mod repository;
pub mod manager;

// 重新导出常用类型和函数
pub use error::{QuickPoolError, QuickPoolResult};
pub use types::*;
pub use config::{
    DatabaseConfigBuilder, GlobalConfig, PoolConfigBuilder, postgres_config, sqlite_config,
};
pub use pool::{
    ConnectionManager, ConnectionPool, DatabaseConnection, HealthCheckOutcome, HealthMonitor,
    HealthReport, HealthStatus, Pool, PoolMetrics, PoolMetricsReport, PoolStatus,
    PooledConnection, PostgresPool, SqlitePool, create_pool,
};
pub use model::{
    FieldDefinition, FieldType, Model, ModelMeta, Relation, boolean_field, datetime_field,
    float_field, integer_field, json_field, reference_field, string_field, text_field,
};
pub use adapter::{DatabaseAdapter, create_adapter};
pub use batch::BatchOperations;
pub use repository::{Repository, RetryPolicy};
pub use manager::PoolManager;

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 获取库信息
pub fn get_info() -> String {
    format!("{} v{}", NAME, VERSION)
}
