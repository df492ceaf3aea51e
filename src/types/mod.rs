//! 数据库类型定义和配置
//!
//! 定义支持的数据库类型、连接配置、连接池配置和通用数据类型

pub mod serde_helpers;
pub mod database_config;
pub mod data_value;

pub use database_config::{
    ConnectionConfig, DatabaseConfig, DatabaseType, PoolConfig, SqliteTuning,
};
pub use data_value::{DataValue, Record};
