//! # 配置管理模块
//!
//! 提供构建器、环境变量和配置文件三种配置来源

pub mod builders;
pub mod convenience;
pub mod core;
pub mod env;

pub use builders::{DatabaseConfigBuilder, PoolConfigBuilder};
pub use convenience::{postgres_config, sqlite_config};
pub use core::GlobalConfig;
