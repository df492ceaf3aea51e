//! # 便利配置函数模块
//!
//! 提供常用数据库配置的便利函数，内部使用 `DatabaseConfig::builder()`

use crate::error::QuickPoolResult;
use crate::types::*;
use std::time::Duration;

/// 创建SQLite数据库配置
///
/// 文件不存在时自动创建，使用默认存储调优参数
pub fn sqlite_config<S: Into<String>, P: Into<String>>(
    alias: S,
    path: P,
    pool_config: PoolConfig,
) -> QuickPoolResult<DatabaseConfig> {
    DatabaseConfig::builder()
        .db_type(DatabaseType::SQLite)
        .connection(ConnectionConfig::SQLite {
            path: path.into(),
            create_if_missing: true,
            tuning: SqliteTuning::default(),
        })
        .pool(pool_config)
        .alias(alias)
        .build()
}

/// 创建PostgreSQL数据库配置
///
/// SSL 模式为 prefer，语句超时 30 秒，建连失败重试 3 次
pub fn postgres_config<S: Into<String>>(
    alias: S,
    host: S,
    port: u16,
    database: S,
    username: S,
    password: S,
    pool_config: PoolConfig,
) -> QuickPoolResult<DatabaseConfig> {
    DatabaseConfig::builder()
        .db_type(DatabaseType::PostgreSQL)
        .connection(ConnectionConfig::PostgreSQL {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            ssl_mode: Some("prefer".to_string()),
            request_timeout: Duration::from_secs(30),
            connect_retries: 3,
        })
        .pool(pool_config)
        .alias(alias)
        .build()
}
