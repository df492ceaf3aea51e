use async_trait::async_trait;
use rat_logger::{debug, warn};
use sqlx::{Connection, Row};

use super::PostgresAdapter;
use super::utils::{build_query, execute, fetch_ids, fetch_records, postgres_conn};
use crate::adapter::query_builder::SqlQueryBuilder;
use crate::adapter::DatabaseAdapter;
use crate::error::{QuickPoolResult, map_sqlx_error};
use crate::model::{ID_FIELD, ModelMeta};
use crate::pool::DatabaseConnection;
use crate::types::{DataValue, DatabaseType, Record};

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn create_table(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
    ) -> QuickPoolResult<()> {
        let conn = postgres_conn(connection)?;
        for sql in self.builder.create_table(meta)? {
            debug!("执行PostgreSQL建表语句: {}", sql);
            sqlx::query(&sql)
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("PostgreSQL建表失败", e))?;
        }
        Ok(())
    }

    async fn insert(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        record: &Record,
    ) -> QuickPoolResult<i64> {
        meta.validate_record(record)?;
        let conn = postgres_conn(connection)?;
        let statement = self
            .builder
            .insert(meta, &[record], record.contains_key(ID_FIELD))?;
        let ids = fetch_ids(&mut *conn, &statement, "PostgreSQL插入失败").await?;
        if record.contains_key(ID_FIELD) {
            sync_id_sequence(conn, &self.builder, meta).await?;
        }
        ids.first()
            .copied()
            .ok_or_else(|| crate::quick_error!(query, "PostgreSQL插入未返回主键"))
    }

    async fn insert_many(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        records: &[Record],
    ) -> QuickPoolResult<Vec<i64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        for record in records {
            meta.validate_record(record)?;
        }

        let conn = postgres_conn(connection)?;
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| map_sqlx_error("PostgreSQL开启事务失败", e))?;

        let explicit_ids = records.iter().any(|r| r.contains_key(ID_FIELD));
        let mut ids = Vec::with_capacity(records.len());
        let mut outcome = Ok(());
        if explicit_ids {
            // 含显式主键时逐行插入，保证返回顺序与输入一致
            for record in records {
                let result = match self.builder.insert(meta, &[record], record.contains_key(ID_FIELD)) {
                    Ok(statement) => fetch_ids(&mut tx, &statement, "PostgreSQL批量插入失败").await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(inserted) => ids.extend(inserted),
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
        } else {
            for chunk in records.chunks(self.builder.rows_per_insert(meta)) {
                let refs: Vec<&Record> = chunk.iter().collect();
                let result = match self.builder.insert(meta, &refs, false) {
                    Ok(statement) => fetch_ids(&mut tx, &statement, "PostgreSQL批量插入失败").await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(mut inserted) => {
                        // BIGSERIAL 按 VALUES 顺序取号
                        inserted.sort_unstable();
                        ids.extend(inserted);
                    }
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
        }

        if explicit_ids && outcome.is_ok() {
            outcome = sync_id_sequence(&mut tx, &self.builder, meta).await;
        }

        match outcome {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| map_sqlx_error("PostgreSQL提交事务失败", e))?;
                debug!("PostgreSQL批量插入 {} 条记录到 {}", ids.len(), meta.table_name);
                Ok(ids)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("PostgreSQL回滚事务失败: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn find_by_id(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        id: i64,
    ) -> QuickPoolResult<Option<Record>> {
        let mut records = self.find_by_ids(connection, meta, &[id]).await?;
        Ok(records.pop())
    }

    async fn find_by_ids(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        ids: &[i64],
    ) -> QuickPoolResult<Vec<Record>> {
        let values: Vec<DataValue> = ids.iter().copied().map(DataValue::Int).collect();
        self.find_by_column_in(connection, meta, ID_FIELD, &values).await
    }

    async fn find_by_column_in(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        column: &str,
        values: &[DataValue],
    ) -> QuickPoolResult<Vec<Record>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let conn = postgres_conn(connection)?;
        let mut records = Vec::with_capacity(values.len());
        for chunk in values.chunks(self.builder.max_params()) {
            let statement = self.builder.select_where_in(meta, column, chunk)?;
            records.extend(fetch_records(&mut *conn, meta, &statement, "PostgreSQL查询失败").await?);
        }
        Ok(records)
    }

    async fn update_by_id(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        id: i64,
        patch: &Record,
    ) -> QuickPoolResult<u64> {
        let statement = self.builder.update_by_id(meta, id, patch)?;
        let conn = postgres_conn(connection)?;
        execute(conn, &statement, "PostgreSQL更新失败").await
    }

    async fn update_many(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        patches: &[(i64, Record)],
    ) -> QuickPoolResult<u64> {
        if patches.is_empty() {
            return Ok(0);
        }
        let statements = patches
            .iter()
            .map(|(id, patch)| self.builder.update_by_id(meta, *id, patch))
            .collect::<QuickPoolResult<Vec<_>>>()?;

        let conn = postgres_conn(connection)?;
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| map_sqlx_error("PostgreSQL开启事务失败", e))?;
        let mut affected = 0;
        for statement in &statements {
            match execute(&mut tx, statement, "PostgreSQL批量更新失败").await {
                Ok(rows) => affected += rows,
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!("PostgreSQL回滚事务失败: {}", rollback_err);
                    }
                    return Err(e);
                }
            }
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("PostgreSQL提交事务失败", e))?;
        Ok(affected)
    }

    async fn delete_by_id(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        id: i64,
    ) -> QuickPoolResult<bool> {
        let statement = self.builder.delete_by_id(meta, id)?;
        let conn = postgres_conn(connection)?;
        Ok(execute(conn, &statement, "PostgreSQL删除失败").await? > 0)
    }

    async fn count(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        criteria: &[(String, DataValue)],
    ) -> QuickPoolResult<i64> {
        let statement = self.builder.count(meta, criteria)?;
        let conn = postgres_conn(connection)?;
        let row = build_query(&statement)
            .fetch_one(conn)
            .await
            .map_err(|e| map_sqlx_error("PostgreSQL计数失败", e))?;
        row.try_get::<i64, _>("count")
            .map_err(|e| map_sqlx_error("PostgreSQL计数失败", e))
    }
}

/// 显式写入主键后把 BIGSERIAL 序列推进到当前最大值，避免后续自增撞号
async fn sync_id_sequence(
    conn: &mut sqlx::PgConnection,
    builder: &SqlQueryBuilder,
    meta: &ModelMeta,
) -> QuickPoolResult<()> {
    let statement = builder.sync_id_sequence(meta)?;
    execute(conn, &statement, "PostgreSQL同步主键序列失败").await?;
    Ok(())
}
