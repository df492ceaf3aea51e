//! # 连接池配置构建器模块
//!
//! 提供连接池配置的构建器实现，支持链式调用，构建时统一校验

use crate::error::QuickPoolResult;
use crate::types::*;
use rat_logger::info;
use std::time::Duration;

/// 连接池配置构建器
///
/// 未设置的配置项使用 `PoolConfig::default()` 中的取值
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    min_connections: Option<u32>,
    max_connections: Option<u32>,
    max_idle_time: Option<Duration>,
    acquire_timeout: Option<Duration>,
    health_check_interval: Option<Duration>,
    health_check_timeout: Option<Duration>,
    metrics_enabled: Option<bool>,
}

impl PoolConfig {
    /// 创建连接池配置构建器
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }
}

impl PoolConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置最小连接数
    pub fn min_connections(mut self, min_connections: u32) -> Self {
        self.min_connections = Some(min_connections);
        self
    }

    /// 设置最大连接数
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// 设置空闲连接回收时间
    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.max_idle_time = Some(idle);
        self
    }

    /// 设置获取连接的最长等待时间
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// 设置后台健康检查间隔
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = Some(interval);
        self
    }

    /// 设置单次存活探测超时
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = Some(timeout);
        self
    }

    /// 设置是否记录运行指标
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = Some(enabled);
        self
    }

    /// 构建连接池配置
    ///
    /// # 错误
    ///
    /// 配置不合理时（例如最小连接数大于最大连接数）返回验证错误
    pub fn build(self) -> QuickPoolResult<PoolConfig> {
        let defaults = PoolConfig::default();
        let config = PoolConfig {
            min_connections: self.min_connections.unwrap_or(defaults.min_connections),
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            max_idle_time: self.max_idle_time.unwrap_or(defaults.max_idle_time),
            acquire_timeout: self.acquire_timeout.unwrap_or(defaults.acquire_timeout),
            health_check_interval: self
                .health_check_interval
                .unwrap_or(defaults.health_check_interval),
            health_check_timeout: self
                .health_check_timeout
                .unwrap_or(defaults.health_check_timeout),
            metrics_enabled: self.metrics_enabled.unwrap_or(defaults.metrics_enabled),
        };
        config.validate()?;

        info!(
            "创建连接池配置: 最小连接数={}, 最大连接数={}, 获取超时={:?}",
            config.min_connections, config.max_connections, config.acquire_timeout
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = PoolConfig::builder()
            .min_connections(2)
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(2))
            .metrics_enabled(false)
            .build()
            .unwrap();

        assert_eq!(config.min_connections, 2);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.acquire_timeout, Duration::from_secs(2));
        assert!(!config.metrics_enabled);
        assert_eq!(config.health_check_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_rejects_inverted_bounds() {
        let result = PoolConfig::builder()
            .min_connections(8)
            .max_connections(2)
            .build();
        assert!(result.is_err());
    }
}
