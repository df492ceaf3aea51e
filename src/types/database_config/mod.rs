use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::QuickPoolResult;
use crate::types::serde_helpers::duration_secs;

/// 支持的数据库类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    /// SQLite 数据库（嵌入式，基于文件）
    SQLite,
    /// PostgreSQL 数据库（远程，基于网络）
    PostgreSQL,
}

impl DatabaseType {
    /// 获取数据库类型的字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::SQLite => "sqlite",
            DatabaseType::PostgreSQL => "postgresql",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatabaseType {
    type Err = crate::error::QuickPoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(DatabaseType::SQLite),
            "postgresql" | "postgres" | "pg" => Ok(DatabaseType::PostgreSQL),
            _ => Err(crate::quick_error!(unsupported_db, s)),
        }
    }
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库别名（默认为 "default"）
    pub alias: String,
    /// 数据库类型
    pub db_type: DatabaseType,
    /// 连接配置
    pub connection: ConnectionConfig,
    /// 连接池配置
    #[serde(default)]
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    /// 校验连接配置与数据库类型一致，并校验连接池配置
    pub fn validate(&self) -> QuickPoolResult<()> {
        let matches_type = matches!(
            (&self.db_type, &self.connection),
            (DatabaseType::SQLite, ConnectionConfig::SQLite { .. })
                | (DatabaseType::PostgreSQL, ConnectionConfig::PostgreSQL { .. })
        );
        if !matches_type {
            return Err(crate::quick_error!(
                config,
                format!("数据库类型 {} 与连接配置不匹配", self.db_type)
            ));
        }
        if self.alias.trim().is_empty() {
            return Err(crate::quick_error!(validation, "alias", "数据库别名不能为空"));
        }
        self.pool.validate()
    }
}

/// 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionConfig {
    /// SQLite 文件路径
    SQLite {
        /// 数据库文件路径，":memory:" 表示内存数据库
        path: String,
        /// 是否创建数据库文件（如果不存在）
        create_if_missing: bool,
        /// 存储引擎调优参数
        #[serde(default)]
        tuning: SqliteTuning,
    },
    /// PostgreSQL 连接配置
    PostgreSQL {
        /// 主机地址
        host: String,
        /// 端口号
        port: u16,
        /// 数据库名
        database: String,
        /// 用户名
        username: String,
        /// 密码
        password: String,
        /// SSL 模式 (disable, allow, prefer, require, verify-ca, verify-full)
        ssl_mode: Option<String>,
        /// 单条语句的超时时间（服务端 statement_timeout）
        #[serde(with = "duration_secs", default = "default_request_timeout")]
        request_timeout: Duration,
        /// 建立连接失败后的重试次数
        #[serde(default = "default_connect_retries")]
        connect_retries: u32,
    },
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_retries() -> u32 {
    3
}

impl ConnectionConfig {
    /// 对应的数据库类型
    pub fn database_type(&self) -> DatabaseType {
        match self {
            ConnectionConfig::SQLite { .. } => DatabaseType::SQLite,
            ConnectionConfig::PostgreSQL { .. } => DatabaseType::PostgreSQL,
        }
    }
}

/// SQLite 存储引擎调优参数
///
/// 新建每个连接时以 PRAGMA 形式应用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteTuning {
    /// 启用 WAL 日志模式（内存数据库忽略）
    pub wal: bool,
    /// 内存映射大小（字节）
    pub mmap_size: u64,
    /// 页缓存大小（KiB）
    pub cache_size_kib: u32,
    /// 锁等待超时
    #[serde(with = "duration_secs")]
    pub busy_timeout: Duration,
}

impl Default for SqliteTuning {
    fn default() -> Self {
        Self {
            wal: true,
            mmap_size: 256 * 1024 * 1024,
            cache_size_kib: 64 * 1024,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// 连接池配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 最小连接数，后台维护会补足到此数量
    pub min_connections: u32,
    /// 最大连接数（空闲与借出之和的上限）
    pub max_connections: u32,
    /// 空闲连接超过此时间后可被回收（保留 min_connections）
    #[serde(with = "duration_secs")]
    pub max_idle_time: Duration,
    /// 获取连接的最长等待时间
    #[serde(with = "duration_secs")]
    pub acquire_timeout: Duration,
    /// 后台健康检查间隔
    #[serde(with = "duration_secs")]
    pub health_check_interval: Duration,
    /// 单次存活探测的超时时间
    #[serde(with = "duration_secs")]
    pub health_check_timeout: Duration,
    /// 是否记录运行指标
    pub metrics_enabled: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            max_idle_time: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
            metrics_enabled: true,
        }
    }
}

impl PoolConfig {
    /// 校验连接池配置
    pub fn validate(&self) -> QuickPoolResult<()> {
        if self.max_connections == 0 {
            return Err(crate::quick_error!(
                validation,
                "max_connections",
                "最大连接数必须大于0"
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(crate::quick_error!(
                validation,
                "min_connections",
                format!(
                    "最小连接数({})不能大于最大连接数({})",
                    self.min_connections, self.max_connections
                )
            ));
        }
        if self.acquire_timeout.is_zero() {
            return Err(crate::quick_error!(
                validation,
                "acquire_timeout",
                "获取连接超时时间必须大于0"
            ));
        }
        if self.health_check_interval.is_zero() {
            return Err(crate::quick_error!(
                validation,
                "health_check_interval",
                "健康检查间隔必须大于0"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.max_idle_time, Duration::from_secs(600));
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let config = PoolConfig {
            min_connections: 5,
            max_connections: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_rejected() {
        let config = PoolConfig {
            min_connections: 0,
            max_connections: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_type_parsing() {
        assert_eq!("PG".parse::<DatabaseType>().unwrap(), DatabaseType::PostgreSQL);
        assert_eq!("sqlite".parse::<DatabaseType>().unwrap(), DatabaseType::SQLite);
        assert!("mysql".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn test_mismatched_connection_rejected() {
        let config = DatabaseConfig {
            alias: "main".to_string(),
            db_type: DatabaseType::PostgreSQL,
            connection: ConnectionConfig::SQLite {
                path: ":memory:".to_string(),
                create_if_missing: true,
                tuning: SqliteTuning::default(),
            },
            pool: PoolConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
