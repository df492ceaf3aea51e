//! # 环境变量配置模块
//!
//! 从进程环境读取连接池与后端选择配置。未设置的变量使用默认值，
//! 无法解析的取值返回配置错误。

use crate::error::QuickPoolResult;
use crate::types::*;
use rat_logger::{debug, info};
use std::time::Duration;

pub const POOL_MIN_CONNECTIONS: &str = "POOL_MIN_CONNECTIONS";
pub const POOL_MAX_CONNECTIONS: &str = "POOL_MAX_CONNECTIONS";
pub const POOL_MAX_IDLE_TIME_SECONDS: &str = "POOL_MAX_IDLE_TIME_SECONDS";
pub const POOL_ACQUIRE_TIMEOUT_SECONDS: &str = "POOL_ACQUIRE_TIMEOUT_SECONDS";
pub const POOL_HEALTH_CHECK_INTERVAL_SECONDS: &str = "POOL_HEALTH_CHECK_INTERVAL_SECONDS";
pub const POOL_HEALTH_CHECK_TIMEOUT_SECONDS: &str = "POOL_HEALTH_CHECK_TIMEOUT_SECONDS";
pub const POOL_METRICS_ENABLED: &str = "POOL_METRICS_ENABLED";

pub const DATABASE_TYPE: &str = "DATABASE_TYPE";
pub const SQLITE_PATH: &str = "SQLITE_PATH";
pub const POSTGRES_HOST: &str = "POSTGRES_HOST";
pub const POSTGRES_PORT: &str = "POSTGRES_PORT";
pub const POSTGRES_DB: &str = "POSTGRES_DB";
pub const POSTGRES_USER: &str = "POSTGRES_USER";
pub const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const POSTGRES_SSL_MODE: &str = "POSTGRES_SSL_MODE";
pub const POSTGRES_REQUEST_TIMEOUT_SECONDS: &str = "POSTGRES_REQUEST_TIMEOUT_SECONDS";
pub const POSTGRES_CONNECT_RETRIES: &str = "POSTGRES_CONNECT_RETRIES";

impl PoolConfig {
    /// 从进程环境变量加载连接池配置
    pub fn from_env() -> QuickPoolResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 通过查找函数加载连接池配置
    ///
    /// `lookup` 对未设置的变量返回 `None`
    pub fn from_lookup<F>(lookup: F) -> QuickPoolResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PoolConfig::default();
        let config = PoolConfig {
            min_connections: parse_or(&lookup, POOL_MIN_CONNECTIONS, defaults.min_connections)?,
            max_connections: parse_or(&lookup, POOL_MAX_CONNECTIONS, defaults.max_connections)?,
            max_idle_time: seconds_or(&lookup, POOL_MAX_IDLE_TIME_SECONDS, defaults.max_idle_time)?,
            acquire_timeout: seconds_or(
                &lookup,
                POOL_ACQUIRE_TIMEOUT_SECONDS,
                defaults.acquire_timeout,
            )?,
            health_check_interval: seconds_or(
                &lookup,
                POOL_HEALTH_CHECK_INTERVAL_SECONDS,
                defaults.health_check_interval,
            )?,
            health_check_timeout: seconds_or(
                &lookup,
                POOL_HEALTH_CHECK_TIMEOUT_SECONDS,
                defaults.health_check_timeout,
            )?,
            metrics_enabled: bool_or(&lookup, POOL_METRICS_ENABLED, defaults.metrics_enabled)?,
        };
        config.validate()?;

        debug!(
            "从环境变量加载连接池配置: min={}, max={}, idle={:?}, acquire={:?}",
            config.min_connections, config.max_connections, config.max_idle_time, config.acquire_timeout
        );
        Ok(config)
    }
}

impl DatabaseConfig {
    /// 从进程环境变量加载数据库配置（含连接池配置）
    pub fn from_env<S: Into<String>>(alias: S) -> QuickPoolResult<Self> {
        Self::from_lookup(alias, |key| std::env::var(key).ok())
    }

    /// 通过查找函数加载数据库配置
    ///
    /// `DATABASE_TYPE` 未设置时默认使用 SQLite
    pub fn from_lookup<S, F>(alias: S, lookup: F) -> QuickPoolResult<Self>
    where
        S: Into<String>,
        F: Fn(&str) -> Option<String>,
    {
        let db_type = match lookup(DATABASE_TYPE) {
            Some(raw) => raw.parse::<DatabaseType>()?,
            None => DatabaseType::SQLite,
        };

        let connection = match db_type {
            DatabaseType::SQLite => ConnectionConfig::SQLite {
                path: lookup(SQLITE_PATH).unwrap_or_else(|| "./data/quickpool.db".to_string()),
                create_if_missing: true,
                tuning: SqliteTuning::default(),
            },
            DatabaseType::PostgreSQL => ConnectionConfig::PostgreSQL {
                host: lookup(POSTGRES_HOST).unwrap_or_else(|| "localhost".to_string()),
                port: parse_or(&lookup, POSTGRES_PORT, 5432u16)?,
                database: required(&lookup, POSTGRES_DB)?,
                username: required(&lookup, POSTGRES_USER)?,
                password: lookup(POSTGRES_PASSWORD).unwrap_or_default(),
                ssl_mode: lookup(POSTGRES_SSL_MODE),
                request_timeout: seconds_or(
                    &lookup,
                    POSTGRES_REQUEST_TIMEOUT_SECONDS,
                    Duration::from_secs(30),
                )?,
                connect_retries: parse_or(&lookup, POSTGRES_CONNECT_RETRIES, 3u32)?,
            },
        };

        let config = DatabaseConfig {
            alias: alias.into(),
            db_type,
            connection,
            pool: PoolConfig::from_lookup(&lookup)?,
        };
        config.validate()?;

        info!("从环境变量加载数据库配置: 别名={}, 类型={}", config.alias, config.db_type);
        Ok(config)
    }
}

fn required<F>(lookup: &F, key: &str) -> QuickPoolResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| crate::quick_error!(config, format!("环境变量 {} 必须设置", key)))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> QuickPoolResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            crate::quick_error!(config, format!("环境变量 {} 的值无效: {}", key, raw))
        }),
    }
}

fn seconds_or<F>(lookup: &F, key: &str, default: Duration) -> QuickPoolResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn bool_or<F>(lookup: &F, key: &str, default: bool) -> QuickPoolResult<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(crate::quick_error!(
                config,
                format!("环境变量 {} 的值无效: {}", key, raw)
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_unset_variables_use_defaults() {
        let config = PoolConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn test_pool_variables_are_applied() {
        let lookup = lookup_from(&[
            (POOL_MIN_CONNECTIONS, "2"),
            (POOL_MAX_CONNECTIONS, "4"),
            (POOL_MAX_IDLE_TIME_SECONDS, "120"),
            (POOL_ACQUIRE_TIMEOUT_SECONDS, "2"),
            (POOL_HEALTH_CHECK_INTERVAL_SECONDS, "15"),
            (POOL_METRICS_ENABLED, "off"),
        ]);
        let config = PoolConfig::from_lookup(lookup).unwrap();
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.max_idle_time, Duration::from_secs(120));
        assert_eq!(config.acquire_timeout, Duration::from_secs(2));
        assert_eq!(config.health_check_interval, Duration::from_secs(15));
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_unparsable_value_is_config_error() {
        let lookup = lookup_from(&[(POOL_MAX_CONNECTIONS, "many")]);
        let err = PoolConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(err, crate::error::QuickPoolError::ConfigError { .. }));
    }

    #[test]
    fn test_postgres_selection_requires_database() {
        let lookup = lookup_from(&[(DATABASE_TYPE, "postgres"), (POSTGRES_USER, "app")]);
        assert!(DatabaseConfig::from_lookup("main", lookup).is_err());

        let lookup = lookup_from(&[
            (DATABASE_TYPE, "postgres"),
            (POSTGRES_USER, "app"),
            (POSTGRES_DB, "stories"),
            (POSTGRES_PORT, "6543"),
        ]);
        let config = DatabaseConfig::from_lookup("main", lookup).unwrap();
        assert_eq!(config.db_type, DatabaseType::PostgreSQL);
        match config.connection {
            ConnectionConfig::PostgreSQL { port, database, .. } => {
                assert_eq!(port, 6543);
                assert_eq!(database, "stories");
            }
            other => panic!("意外的连接配置: {:?}", other),
        }
    }
}
