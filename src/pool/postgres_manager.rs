//! PostgreSQL 连接管理

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rat_logger::{debug, info, warn};
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection};

use super::manager::ConnectionManager;
use super::types::DatabaseConnection;
use crate::error::{QuickPoolError, QuickPoolResult};
use crate::types::{ConnectionConfig, DatabaseConfig, DatabaseType};

/// 重连退避的基础间隔
const RETRY_BASE_DELAY_MS: u64 = 200;
/// 重连退避上限
const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// 为 PostgreSQL 建立独立连接
///
/// 建连失败时按指数退避重试 `connect_retries` 次
pub struct PostgresManager {
    alias: String,
    options: PgConnectOptions,
    /// 去掉密码的连接串，仅用于日志
    display_url: String,
    connect_retries: u32,
}

impl PostgresManager {
    pub fn new(config: &DatabaseConfig) -> QuickPoolResult<Self> {
        let ConnectionConfig::PostgreSQL {
            host,
            port,
            database,
            username,
            password,
            ssl_mode,
            request_timeout,
            connect_retries,
        } = &config.connection
        else {
            return Err(QuickPoolError::ConfigError {
                message: "PostgreSQL连接配置类型不匹配".to_string(),
            });
        };

        // 对密码进行 URL 编码以处理特殊字符
        let encoded_password = urlencoding::encode(password);
        let mut url = format!(
            "postgresql://{}:{}@{}:{}/{}",
            username, encoded_password, host, port, database
        );
        let mut display_url = format!("postgresql://{}:***@{}:{}/{}", username, host, port, database);
        if let Some(mode) = ssl_mode {
            url.push_str(&format!("?sslmode={}", mode));
            display_url.push_str(&format!("?sslmode={}", mode));
        }

        let options = PgConnectOptions::from_str(&url)
            .map_err(|e| QuickPoolError::ConfigError {
                message: format!("PostgreSQL连接参数无效: {}", e),
            })?
            .application_name("rat_quickpool")
            .options([(
                "statement_timeout",
                request_timeout.as_millis().to_string(),
            )])
            .disable_statement_logging();

        info!("PostgreSQL连接目标: 别名={}, {}", config.alias, display_url);

        Ok(Self {
            alias: config.alias.clone(),
            options,
            display_url,
            connect_retries: *connect_retries,
        })
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let exponential = RETRY_BASE_DELAY_MS.saturating_mul(2_u64.pow(attempt.min(10)));
        let capped = exponential.min(RETRY_MAX_DELAY_MS);
        let jitter = rand::thread_rng().gen_range(0..=capped / 4);
        Duration::from_millis(capped + jitter)
    }
}

#[async_trait]
impl ConnectionManager for PostgresManager {
    type Connection = DatabaseConnection;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn connect(&self) -> QuickPoolResult<DatabaseConnection> {
        let mut attempt = 0;
        loop {
            match sqlx::PgConnection::connect_with(&self.options).await {
                Ok(conn) => {
                    debug!("PostgreSQL连接建立: 别名={}", self.alias);
                    return Ok(DatabaseConnection::PostgreSQL(conn));
                }
                Err(e) if attempt < self.connect_retries => {
                    let delay = Self::backoff_delay(attempt);
                    attempt += 1;
                    warn!(
                        "PostgreSQL连接失败，{:?} 后进行第 {}/{} 次重试: {}, 错误={}",
                        delay, attempt, self.connect_retries, self.display_url, e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(QuickPoolError::ConnectionCreationFailed {
                        message: format!(
                            "PostgreSQL连接失败: 别名={}, {}, {}",
                            self.alias, self.display_url, e
                        ),
                        source: Some(e),
                    });
                }
            }
        }
    }

    async fn ping(&self, conn: &mut DatabaseConnection) -> QuickPoolResult<()> {
        match conn {
            DatabaseConnection::PostgreSQL(conn) => sqlx::query("SELECT 1")
                .execute(conn)
                .await
                .map(|_| ())
                .map_err(|e| QuickPoolError::HealthCheckFailed {
                    message: format!("PostgreSQL探测失败: {}", e),
                }),
            other => Err(QuickPoolError::HealthCheckFailed {
                message: format!("PostgreSQL管理器收到 {} 连接", other.database_type()),
            }),
        }
    }

    async fn close(&self, conn: DatabaseConnection) {
        if let DatabaseConnection::PostgreSQL(conn) = conn {
            if let Err(e) = conn.close().await {
                debug!("关闭PostgreSQL连接出错: {}", e);
            }
        }
    }
}
