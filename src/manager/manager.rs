//! 连接池管理器核心定义

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rat_logger::info;

use crate::config::GlobalConfig;
use crate::error::QuickPoolResult;
use crate::pool::Pool;

/// 连接池管理器 - 管理多个数据库连接池
pub struct PoolManager {
    /// 数据库连接池映射 (别名 -> 连接池)
    pub(crate) pools: Arc<DashMap<String, Arc<dyn Pool>>>,
    /// 默认数据库别名
    pub(crate) default_alias: Arc<RwLock<Option<String>>>,
}

impl PoolManager {
    /// 创建空的连接池管理器
    pub fn new() -> Self {
        info!("创建连接池管理器");

        Self {
            pools: Arc::new(DashMap::new()),
            default_alias: Arc::new(RwLock::new(None)),
        }
    }

    /// 按全局配置为每个数据库创建连接池
    ///
    /// 任一连接池创建失败时，已创建的连接池会被关闭，并返回该错误
    pub async fn from_config(config: &GlobalConfig) -> QuickPoolResult<Self> {
        config.validate()?;
        let manager = Self::new();

        let mut aliases: Vec<&String> = config.databases.keys().collect();
        aliases.sort();
        for alias in aliases {
            if let Err(e) = manager.add_database(config.databases[alias].clone()).await {
                manager.shutdown().await;
                return Err(e);
            }
        }

        if let Some(default) = &config.default_database {
            manager.set_default_alias(default)?;
        }
        Ok(manager)
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("aliases", &self.aliases())
            .field("default_alias", &*self.default_alias.read())
            .finish()
    }
}
