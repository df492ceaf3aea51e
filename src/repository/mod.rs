//! 仓储层
//!
//! 每次调用借出恰好一个连接（批量方法整批共用一个），返回前归还，
//! 无论成功与否。连接层面的错误会在归还前把连接标记为不健康，由池关闭替换。

mod models;
mod retry;

pub use models::{Author, Character, Plot, World};
pub use retry::RetryPolicy;

use std::marker::PhantomData;
use std::sync::Arc;

use rat_logger::{debug, warn};

use crate::adapter::{DatabaseAdapter, create_adapter};
use crate::batch::BatchOperations;
use crate::error::{QuickPoolError, QuickPoolResult};
use crate::model::{Model, Relation};
use crate::pool::{DatabaseConnection, Pool, PooledConnection};
use crate::types::{DataValue, Record};

/// 模型 `T` 的仓储
pub struct Repository<T: Model> {
    pool: Arc<dyn Pool>,
    adapter: Arc<dyn DatabaseAdapter>,
    batch: BatchOperations,
    retry: RetryPolicy,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            adapter: self.adapter.clone(),
            batch: self.batch.clone(),
            retry: self.retry,
            _model: PhantomData,
        }
    }
}

impl<T: Model> Repository<T> {
    /// 使用注入的连接池创建仓储，适配器按池的后端类型选择
    pub fn new(pool: Arc<dyn Pool>) -> Self {
        let adapter = create_adapter(pool.database_type());
        Self {
            pool,
            batch: BatchOperations::new(adapter.clone()),
            adapter,
            retry: RetryPolicy::default(),
            _model: PhantomData,
        }
    }

    /// 替换获取连接的重试策略
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn pool(&self) -> &Arc<dyn Pool> {
        &self.pool
    }

    async fn checkout(&self) -> QuickPoolResult<PooledConnection<DatabaseConnection>> {
        let pool = &self.pool;
        self.retry.run(move || pool.acquire()).await
    }

    /// 归还连接并原样返回操作结果
    fn finish<R>(
        &self,
        mut conn: PooledConnection<DatabaseConnection>,
        result: QuickPoolResult<R>,
    ) -> QuickPoolResult<R> {
        if let Err(e) = &result {
            if e.is_connection_error() {
                warn!("连接 {} 在使用中出错，归还时关闭: {}", conn.id(), e);
                conn.mark_unhealthy();
            }
        }
        if let Err(e) = self.pool.release(conn) {
            warn!("归还连接失败: {}", e);
        }
        result
    }

    /// 建表（已存在时跳过）
    pub async fn ensure_schema(&self) -> QuickPoolResult<()> {
        let mut conn = self.checkout().await?;
        let result = self.adapter.create_table(&mut conn, &T::meta()).await;
        self.finish(conn, result)
    }

    /// 保存一个模型，返回主键
    pub async fn save(&self, model: &T) -> QuickPoolResult<i64> {
        let record = model.to_record()?;
        let mut conn = self.checkout().await?;
        let result = self.adapter.insert(&mut conn, &T::meta(), &record).await;
        self.finish(conn, result)
    }

    /// 按主键读取，不存在时返回 `NotFound`
    pub async fn get(&self, id: i64) -> QuickPoolResult<T> {
        let meta = T::meta();
        let mut conn = self.checkout().await?;
        let result = self.adapter.find_by_id(&mut conn, &meta, id).await;
        match self.finish(conn, result)? {
            Some(record) => T::from_record(record),
            None => Err(QuickPoolError::NotFound {
                table: meta.table_name,
                id: id.to_string(),
            }),
        }
    }

    /// 批量保存，按输入顺序返回主键；任一条失败则全部不保存
    pub async fn save_many(&self, models: &[T]) -> QuickPoolResult<Vec<i64>> {
        if models.is_empty() {
            return Ok(Vec::new());
        }
        let records = models
            .iter()
            .map(Model::to_record)
            .collect::<QuickPoolResult<Vec<_>>>()?;
        let mut conn = self.checkout().await?;
        let result = self.batch.batch_insert(&mut conn, &T::meta(), &records).await;
        self.finish(conn, result)
    }

    /// 按主键批量读取，结果按主键升序
    pub async fn get_many(&self, ids: &[i64]) -> QuickPoolResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.checkout().await?;
        let result = self.batch.batch_select_by_ids(&mut conn, &T::meta(), ids).await;
        self.finish(conn, result)?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    /// 读取多个模型及其关联的子模型，父模型按 `ids` 的顺序返回
    pub async fn get_many_with_related<R: Model>(
        &self,
        ids: &[i64],
        relation: &Relation,
    ) -> QuickPoolResult<Vec<(T, Vec<R>)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.checkout().await?;
        let result = self
            .batch
            .fetch_with_related(&mut conn, &T::meta(), ids, relation, &R::meta())
            .await;
        let rows = self.finish(conn, result)?;
        debug!("关联读取 {} 条 {} 记录", rows.len(), T::table_name());

        rows.into_iter()
            .map(|(parent, children)| {
                let parent = T::from_record(parent)?;
                let children = children
                    .into_iter()
                    .map(R::from_record)
                    .collect::<QuickPoolResult<Vec<_>>>()?;
                Ok((parent, children))
            })
            .collect()
    }

    /// 按主键更新部分字段，记录存在时返回 true
    pub async fn update(&self, id: i64, patch: &Record) -> QuickPoolResult<bool> {
        let mut conn = self.checkout().await?;
        let result = self
            .adapter
            .update_by_id(&mut conn, &T::meta(), id, patch)
            .await;
        Ok(self.finish(conn, result)? > 0)
    }

    /// 批量更新，返回受影响行数之和；任一条失败则全部回滚
    pub async fn update_many(&self, patches: &[(i64, Record)]) -> QuickPoolResult<u64> {
        if patches.is_empty() {
            return Ok(0);
        }
        let mut conn = self.checkout().await?;
        let result = self.batch.batch_update(&mut conn, &T::meta(), patches).await;
        self.finish(conn, result)
    }

    /// 按主键删除，记录存在时返回 true
    pub async fn delete(&self, id: i64) -> QuickPoolResult<bool> {
        let mut conn = self.checkout().await?;
        let result = self.adapter.delete_by_id(&mut conn, &T::meta(), id).await;
        self.finish(conn, result)
    }

    /// 按等值条件计数
    pub async fn count_by(&self, criteria: &[(&str, DataValue)]) -> QuickPoolResult<i64> {
        let criteria: Vec<(String, DataValue)> = criteria
            .iter()
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect();
        let mut conn = self.checkout().await?;
        let result = self.adapter.count(&mut conn, &T::meta(), &criteria).await;
        self.finish(conn, result)
    }
}
