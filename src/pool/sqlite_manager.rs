//! SQLite 连接管理

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use rat_logger::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};

use super::manager::ConnectionManager;
use super::types::DatabaseConnection;
use crate::error::{QuickPoolError, QuickPoolResult};
use crate::types::{ConnectionConfig, DatabaseConfig, DatabaseType, SqliteTuning};

/// 内存数据库路径
pub const MEMORY_PATH: &str = ":memory:";

/// 为 SQLite 文件或内存数据库建立连接
///
/// 连接选项在构造时确定，之后每个连接都用同一份选项建立。
/// `:memory:` 使用共享缓存的命名内存库，同一个池里的连接看到同一份数据。
pub struct SqliteManager {
    alias: String,
    options: SqliteConnectOptions,
}

impl SqliteManager {
    pub fn new(config: &DatabaseConfig) -> QuickPoolResult<Self> {
        let (path, create_if_missing, tuning) = match &config.connection {
            ConnectionConfig::SQLite {
                path,
                create_if_missing,
                tuning,
            } => (path.as_str(), *create_if_missing, tuning),
            _ => {
                return Err(QuickPoolError::ConfigError {
                    message: "SQLite连接配置类型不匹配".to_string(),
                });
            }
        };

        let options = if path == MEMORY_PATH {
            info!("使用SQLite内存数据库: 别名={}", config.alias);
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                QuickPoolError::ConfigError {
                    message: format!("SQLite内存数据库选项无效: {}", e),
                }
            })?
        } else {
            let file = Path::new(path);
            if !file.exists() {
                if !create_if_missing {
                    return Err(QuickPoolError::ConfigError {
                        message: format!("SQLite数据库文件不存在且未启用自动创建: {}", path),
                    });
                }
                if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
            }
            apply_tuning(
                SqliteConnectOptions::new()
                    .filename(file)
                    .create_if_missing(create_if_missing),
                tuning,
            )
        };

        Ok(Self {
            alias: config.alias.clone(),
            options: options.foreign_keys(true).disable_statement_logging(),
        })
    }
}

fn apply_tuning(options: SqliteConnectOptions, tuning: &SqliteTuning) -> SqliteConnectOptions {
    let journal = if tuning.wal {
        SqliteJournalMode::Wal
    } else {
        SqliteJournalMode::Delete
    };
    options
        .journal_mode(journal)
        .busy_timeout(tuning.busy_timeout)
        .pragma("mmap_size", tuning.mmap_size.to_string())
        // 负值表示以 KiB 为单位
        .pragma("cache_size", format!("-{}", tuning.cache_size_kib))
}

#[async_trait]
impl ConnectionManager for SqliteManager {
    type Connection = DatabaseConnection;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn connect(&self) -> QuickPoolResult<DatabaseConnection> {
        debug!("建立SQLite连接: 别名={}", self.alias);
        let conn = sqlx::SqliteConnection::connect_with(&self.options)
            .await
            .map_err(|e| QuickPoolError::ConnectionCreationFailed {
                message: format!("SQLite连接失败: 别名={}, {}", self.alias, e),
                source: Some(e),
            })?;
        Ok(DatabaseConnection::SQLite(conn))
    }

    async fn ping(&self, conn: &mut DatabaseConnection) -> QuickPoolResult<()> {
        match conn {
            DatabaseConnection::SQLite(conn) => sqlx::query("SELECT 1")
                .execute(conn)
                .await
                .map(|_| ())
                .map_err(|e| QuickPoolError::HealthCheckFailed {
                    message: format!("SQLite探测失败: {}", e),
                }),
            other => Err(QuickPoolError::HealthCheckFailed {
                message: format!("SQLite管理器收到 {} 连接", other.database_type()),
            }),
        }
    }

    async fn close(&self, conn: DatabaseConnection) {
        if let DatabaseConnection::SQLite(conn) = conn {
            if let Err(e) = conn.close().await {
                debug!("关闭SQLite连接出错: {}", e);
            }
        }
    }
}
