//! 数据库注册与查找

use std::sync::Arc;

use rat_logger::{error, info, warn};

use crate::error::QuickPoolResult;
use crate::pool::{DatabaseConnection, Pool, PooledConnection, create_pool};
use crate::types::{DatabaseConfig, DatabaseType};

use super::PoolManager;

impl PoolManager {
    /// 添加数据库配置并创建连接池
    ///
    /// 别名已存在时，旧连接池被关闭并替换。第一个添加的数据库成为默认数据库。
    pub async fn add_database(&self, config: DatabaseConfig) -> QuickPoolResult<()> {
        let alias = config.alias.clone();

        info!("添加数据库配置: 别名={}, 类型={}", alias, config.db_type);

        let pool = create_pool(&config).await.map_err(|e| {
            error!("连接池创建失败: 别名={}, 错误={}", alias, e);
            e
        })?;

        if let Some(previous) = self.pools.insert(alias.clone(), pool) {
            warn!("数据库别名已存在，关闭并替换旧连接池: {}", alias);
            previous.shutdown().await;
        }

        {
            let mut default_alias = self.default_alias.write();
            if default_alias.is_none() {
                *default_alias = Some(alias.clone());
                info!("设置默认数据库别名: {}", alias);
            }
        }

        info!("数据库添加成功: 别名={}", alias);
        Ok(())
    }

    /// 移除数据库并关闭其连接池
    pub async fn remove_database(&self, alias: &str) -> QuickPoolResult<()> {
        info!("移除数据库配置: 别名={}", alias);

        let (_, pool) = self
            .pools
            .remove(alias)
            .ok_or_else(|| crate::quick_error!(alias_not_found, alias))?;

        {
            let mut default_alias = self.default_alias.write();
            if default_alias.as_deref() == Some(alias) {
                *default_alias = self.aliases().into_iter().next();
                match default_alias.as_ref() {
                    Some(new_default) => info!("重新设置默认数据库别名: {}", new_default),
                    None => info!("没有可用的数据库，清空默认别名"),
                }
            }
        }

        pool.shutdown().await;
        info!("数据库配置已移除: 别名={}", alias);
        Ok(())
    }

    /// 按别名获取连接池
    pub fn get_pool(&self, alias: &str) -> QuickPoolResult<Arc<dyn Pool>> {
        self.pools
            .get(alias)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| crate::quick_error!(alias_not_found, alias))
    }

    /// 获取默认连接池
    pub fn default_pool(&self) -> QuickPoolResult<Arc<dyn Pool>> {
        let alias = self
            .default_alias()
            .ok_or_else(|| crate::quick_error!(config, "没有配置默认数据库别名"))?;
        self.get_pool(&alias)
    }

    /// 从指定（或默认）数据库借出一个连接
    pub async fn get_connection(
        &self,
        alias: Option<&str>,
    ) -> QuickPoolResult<PooledConnection<DatabaseConnection>> {
        let pool = match alias {
            Some(alias) => self.get_pool(alias)?,
            None => self.default_pool()?,
        };
        pool.acquire().await
    }

    /// 获取所有数据库别名（按字典序）
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.pools.iter().map(|entry| entry.key().clone()).collect();
        aliases.sort();
        aliases
    }

    pub fn default_alias(&self) -> Option<String> {
        self.default_alias.read().clone()
    }

    /// 设置默认数据库别名
    pub fn set_default_alias(&self, alias: &str) -> QuickPoolResult<()> {
        if !self.pools.contains_key(alias) {
            return Err(crate::quick_error!(alias_not_found, alias));
        }
        *self.default_alias.write() = Some(alias.to_string());
        info!("设置默认数据库别名: {}", alias);
        Ok(())
    }

    /// 获取数据库类型
    pub fn database_type(&self, alias: &str) -> QuickPoolResult<DatabaseType> {
        Ok(self.get_pool(alias)?.database_type())
    }
}
