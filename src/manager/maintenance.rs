//! 维护操作：指标汇总、健康检查、关闭

use std::collections::HashMap;
use std::sync::Arc;

use rat_logger::{debug, info};

use crate::pool::{HealthReport, Pool, PoolMetricsReport};

use super::PoolManager;

impl PoolManager {
    /// 各连接池的指标快照
    pub fn metrics(&self) -> HashMap<String, PoolMetricsReport> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect()
    }

    /// 对每个连接池做一次健康探测
    pub async fn health_check(&self) -> HashMap<String, HealthReport> {
        let pools = self.snapshot();
        let mut reports = HashMap::with_capacity(pools.len());
        for (alias, pool) in pools {
            let report = pool.health().await;
            debug!("连接池 {} 健康状态: {}", alias, report.status.as_str());
            reports.insert(alias, report);
        }
        reports
    }

    /// 关闭并移除全部连接池
    pub async fn shutdown(&self) {
        info!("开始关闭连接池管理器");

        let pools = self.snapshot();
        self.pools.clear();
        *self.default_alias.write() = None;

        for (alias, pool) in pools {
            pool.shutdown().await;
            debug!("连接池已关闭: {}", alias);
        }
        info!("连接池管理器已关闭");
    }

    /// DashMap 的引用不能跨 await 持有，先复制出来
    fn snapshot(&self) -> Vec<(String, Arc<dyn Pool>)> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
