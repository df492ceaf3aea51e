//! # 配置管理模块 - 核心配置类型
//!
//! 多数据库配置文件（TOML 或 JSON）的加载与保存

use crate::error::{QuickPoolError, QuickPoolResult};
use crate::types::*;
use rat_logger::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 全局配置
///
/// 负责管理多个命名数据库的配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// 数据库配置映射 (别名 -> 配置)
    pub databases: HashMap<String, DatabaseConfig>,
    /// 默认数据库别名
    #[serde(default)]
    pub default_database: Option<String>,
}

impl GlobalConfig {
    /// 从配置文件加载配置
    ///
    /// 扩展名为 `.toml` 时按 TOML 解析，否则按 JSON 解析
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> QuickPoolResult<Self> {
        let path = config_path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let mut config: GlobalConfig = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                crate::quick_error!(config, format!("解析JSON配置文件失败: {}", e))
            })?
        };

        // 映射中的键即别名
        for (alias, db) in config.databases.iter_mut() {
            if db.alias != *alias {
                db.alias = alias.clone();
            }
        }
        config.validate()?;

        info!("从文件加载配置: {:?}, 数据库数量={}", path, config.databases.len());
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, config_path: P) -> QuickPoolResult<()> {
        let path = config_path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| crate::quick_error!(config, format!("序列化TOML配置失败: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)?
        };

        std::fs::write(path, content)?;
        info!("保存配置到文件: {:?}", path);
        Ok(())
    }

    /// 校验全部数据库配置与默认别名
    pub fn validate(&self) -> QuickPoolResult<()> {
        for db in self.databases.values() {
            db.validate()?;
        }
        if let Some(alias) = &self.default_database {
            if !self.databases.contains_key(alias) {
                return Err(QuickPoolError::AliasNotFound {
                    alias: alias.clone(),
                });
            }
        }
        Ok(())
    }

    /// 获取默认数据库配置
    pub fn get_default_database(&self) -> QuickPoolResult<&DatabaseConfig> {
        let alias = self
            .default_database
            .as_ref()
            .ok_or_else(|| crate::quick_error!(config, "未设置默认数据库"))?;
        self.get_database(alias)
    }

    /// 获取指定别名的数据库配置
    pub fn get_database(&self, alias: &str) -> QuickPoolResult<&DatabaseConfig> {
        self.databases
            .get(alias)
            .ok_or_else(|| crate::quick_error!(alias_not_found, alias))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_load_toml_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
default_database = "main"

[databases.main]
alias = "main"
db_type = "SQLite"

[databases.main.connection.SQLite]
path = ":memory:"
create_if_missing = true

[databases.main.pool]
min_connections = 2
max_connections = 4
acquire_timeout = 2
"#
        )
        .unwrap();

        let config = GlobalConfig::from_file(file.path()).unwrap();
        let main = config.get_default_database().unwrap();
        assert_eq!(main.db_type, DatabaseType::SQLite);
        assert_eq!(main.pool.min_connections, 2);
        assert_eq!(main.pool.max_connections, 4);
        assert_eq!(main.pool.acquire_timeout, Duration::from_secs(2));
        // 未写出的字段取默认值
        assert_eq!(main.pool.max_idle_time, Duration::from_secs(600));
    }

    #[test]
    fn test_unknown_default_alias_rejected() {
        let config = GlobalConfig {
            databases: HashMap::new(),
            default_database: Some("missing".to_string()),
        };
        assert!(matches!(
            config.validate(),
            Err(QuickPoolError::AliasNotFound { .. })
        ));
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let db = crate::config::sqlite_config("cache", ":memory:", PoolConfig::default()).unwrap();
        let mut databases = HashMap::new();
        databases.insert("cache".to_string(), db);
        let config = GlobalConfig {
            databases,
            default_database: Some("cache".to_string()),
        };

        let file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        config.save_to_file(file.path()).unwrap();
        let loaded = GlobalConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.get_default_database().unwrap().alias, "cache");
    }
}
