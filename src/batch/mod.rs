//! 批量操作
//!
//! 在一个借出的连接上完成批量插入、按主键批量查询、批量更新和关联预取，
//! 把逐条往返合并为每层关系一次查询。写操作失败时整批回滚，
//! 并统一包装为 `BatchRolledBack`。

use std::collections::HashMap;
use std::sync::Arc;

use rat_logger::debug;

use crate::adapter::DatabaseAdapter;
use crate::error::QuickPoolResult;
use crate::model::{ID_FIELD, ModelMeta, Relation};
use crate::pool::DatabaseConnection;
use crate::quick_error;
use crate::types::{DataValue, Record};

/// 父记录及其子记录
pub type RelatedRecords = (Record, Vec<Record>);

#[derive(Clone)]
pub struct BatchOperations {
    adapter: Arc<dyn DatabaseAdapter>,
}

impl BatchOperations {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self { adapter }
    }

    /// 批量插入，按输入顺序返回主键
    ///
    /// 所有记录在一个事务中写入，任一条失败则全部回滚。空输入直接返回空列表。
    pub async fn batch_insert(
        &self,
        conn: &mut DatabaseConnection,
        meta: &ModelMeta,
        records: &[Record],
    ) -> QuickPoolResult<Vec<i64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self
            .adapter
            .insert_many(conn, meta, records)
            .await
            .map_err(|e| e.into_batch("batch_insert"))?;
        if ids.len() != records.len() {
            return Err(quick_error!(
                query,
                format!("批量插入返回 {} 个主键，期望 {} 个", ids.len(), records.len())
            )
            .into_batch("batch_insert"));
        }
        debug!("批量插入 {} 条记录到 {}", ids.len(), meta.table_name);
        Ok(ids)
    }

    /// 按主键批量查询
    ///
    /// 一次 `IN` 查询（超过参数上限时分段）。结果按主键升序返回，
    /// 需要与输入顺序一致的调用者应自行重排；不存在的主键不会出现在结果中。
    pub async fn batch_select_by_ids(
        &self,
        conn: &mut DatabaseConnection,
        meta: &ModelMeta,
        ids: &[i64],
    ) -> QuickPoolResult<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.adapter.find_by_ids(conn, meta, ids).await
    }

    /// 批量更新，返回受影响行数之和，供调用者与期望数量比对
    pub async fn batch_update(
        &self,
        conn: &mut DatabaseConnection,
        meta: &ModelMeta,
        patches: &[(i64, Record)],
    ) -> QuickPoolResult<u64> {
        if patches.is_empty() {
            return Ok(0);
        }
        self.adapter
            .update_many(conn, meta, patches)
            .await
            .map_err(|e| e.into_batch("batch_update"))
    }

    /// 关联预取：一次查父记录，一次查全部子记录，在内存中拼接
    ///
    /// 父记录按 `parent_ids` 的顺序返回，缺失的主键被跳过
    pub async fn fetch_with_related(
        &self,
        conn: &mut DatabaseConnection,
        parent_meta: &ModelMeta,
        parent_ids: &[i64],
        relation: &Relation,
        child_meta: &ModelMeta,
    ) -> QuickPoolResult<Vec<RelatedRecords>> {
        if relation.table != child_meta.table_name {
            return Err(quick_error!(
                validation,
                relation.name,
                format!(
                    "关系指向表 {}，但子模型的表为 {}",
                    relation.table, child_meta.table_name
                )
            ));
        }
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let parents = self.adapter.find_by_ids(conn, parent_meta, parent_ids).await?;
        let mut parents_by_id: HashMap<i64, Record> = parents
            .into_iter()
            .filter_map(|record| record_id(&record).map(|id| (id, record)))
            .collect();

        let found: Vec<DataValue> = parents_by_id.keys().copied().map(DataValue::Int).collect();
        let children = self
            .adapter
            .find_by_column_in(conn, child_meta, relation.foreign_key, &found)
            .await?;

        let mut children_by_parent: HashMap<i64, Vec<Record>> = HashMap::new();
        for child in children {
            if let Some(parent_id) = child.get(relation.foreign_key).and_then(DataValue::as_i64) {
                children_by_parent.entry(parent_id).or_default().push(child);
            }
        }

        debug!(
            "关联预取 {}: 父记录 {} 条, 关系 {}",
            parent_meta.table_name,
            parents_by_id.len(),
            relation.name
        );

        let mut result = Vec::with_capacity(parents_by_id.len());
        for id in parent_ids {
            if let Some(parent) = parents_by_id.remove(id) {
                let related = children_by_parent.remove(id).unwrap_or_default();
                result.push((parent, related));
            }
        }
        Ok(result)
    }
}

fn record_id(record: &Record) -> Option<i64> {
    record.get(ID_FIELD).and_then(DataValue::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::create_adapter;
    use crate::model::{reference_field, string_field};
    use crate::pool::{ConnectionManager, SqliteManager};
    use crate::types::{DatabaseType, PoolConfig};

    fn authors() -> ModelMeta {
        ModelMeta::new("authors", vec![string_field("name").required().unique()])
    }

    fn plots() -> ModelMeta {
        ModelMeta::new(
            "plots",
            vec![
                reference_field("author_id", "authors").required(),
                string_field("title").required(),
            ],
        )
    }

    const PLOTS: Relation = Relation {
        name: "plots",
        table: "plots",
        foreign_key: "author_id",
    };

    fn named(name: &str) -> Record {
        let mut record = Record::new();
        record.insert("name".into(), DataValue::String(name.into()));
        record
    }

    async fn connection() -> (SqliteManager, DatabaseConnection) {
        let config = crate::config::sqlite_config("batch", ":memory:", PoolConfig::default()).unwrap();
        let manager = SqliteManager::new(&config).unwrap();
        let conn = manager.connect().await.unwrap();
        (manager, conn)
    }

    #[tokio::test]
    async fn test_empty_batches_do_not_touch_backend() {
        let (_manager, mut conn) = connection().await;
        let batch = BatchOperations::new(create_adapter(DatabaseType::SQLite));
        // 表不存在，若访问后端会报错
        assert!(batch.batch_insert(&mut conn, &authors(), &[]).await.unwrap().is_empty());
        assert!(batch.batch_select_by_ids(&mut conn, &authors(), &[]).await.unwrap().is_empty());
        assert_eq!(batch.batch_update(&mut conn, &authors(), &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_with_related_keeps_parent_order() {
        let (_manager, mut conn) = connection().await;
        let adapter = create_adapter(DatabaseType::SQLite);
        adapter.create_table(&mut conn, &authors()).await.unwrap();
        adapter.create_table(&mut conn, &plots()).await.unwrap();
        let batch = BatchOperations::new(adapter);

        let ids = batch
            .batch_insert(&mut conn, &authors(), &[named("林"), named("陈"), named("吴")])
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);

        let plot = |author_id: i64, title: &str| {
            let mut record = Record::new();
            record.insert("author_id".into(), DataValue::Int(author_id));
            record.insert("title".into(), DataValue::String(title.into()));
            record
        };
        batch
            .batch_insert(
                &mut conn,
                &plots(),
                &[plot(ids[0], "雾港"), plot(ids[2], "白塔"), plot(ids[0], "回声")],
            )
            .await
            .unwrap();

        let related = batch
            .fetch_with_related(&mut conn, &authors(), &[ids[2], 9999, ids[0], ids[1]], &PLOTS, &plots())
            .await
            .unwrap();
        let order: Vec<i64> = related.iter().map(|(p, _)| record_id(p).unwrap()).collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
        assert_eq!(related[0].1.len(), 1);
        assert_eq!(related[1].1.len(), 2);
        assert!(related[2].1.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_is_wrapped_and_rolled_back() {
        let (_manager, mut conn) = connection().await;
        let adapter = create_adapter(DatabaseType::SQLite);
        adapter.create_table(&mut conn, &authors()).await.unwrap();
        let batch = BatchOperations::new(adapter.clone());

        let err = batch
            .batch_insert(&mut conn, &authors(), &[named("林"), named("陈"), named("林")])
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
        assert!(matches!(err, crate::error::QuickPoolError::BatchRolledBack { .. }));
        assert_eq!(adapter.count(&mut conn, &authors(), &[]).await.unwrap(), 0);
    }
}
