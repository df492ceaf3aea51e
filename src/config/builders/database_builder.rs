//! # 数据库配置构建器模块
//!
//! 提供数据库配置的构建器实现，支持链式调用和严格验证

use crate::error::QuickPoolResult;
use crate::types::*;
use rat_logger::info;

/// 数据库配置构建器
///
/// 连接配置必须显式设置；数据库类型可由连接配置推断，
/// 别名默认为 "default"，连接池配置默认为 `PoolConfig::default()`
#[derive(Debug, Default)]
pub struct DatabaseConfigBuilder {
    db_type: Option<DatabaseType>,
    connection: Option<ConnectionConfig>,
    pool: Option<PoolConfig>,
    alias: Option<String>,
}

impl DatabaseConfig {
    /// 创建数据库配置构建器
    pub fn builder() -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::new()
    }
}

impl DatabaseConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置数据库类型
    pub fn db_type(mut self, db_type: DatabaseType) -> Self {
        self.db_type = Some(db_type);
        self
    }

    /// 设置连接配置
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = Some(connection);
        self
    }

    /// 设置连接池配置
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    /// 设置数据库别名
    pub fn alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// 构建数据库配置
    ///
    /// # 错误
    ///
    /// 未设置连接配置、类型与连接配置不一致或连接池配置非法时返回错误
    pub fn build(self) -> QuickPoolResult<DatabaseConfig> {
        let connection = self
            .connection
            .ok_or_else(|| crate::quick_error!(config, "连接配置必须设置"))?;
        let db_type = self.db_type.unwrap_or_else(|| connection.database_type());

        let config = DatabaseConfig {
            alias: self.alias.unwrap_or_else(|| "default".to_string()),
            db_type,
            connection,
            pool: self.pool.unwrap_or_default(),
        };
        config.validate()?;

        info!("创建数据库配置: 别名={}, 类型={}", config.alias, config.db_type);
        Ok(config)
    }
}
