//! 数据库适配器模块
//!
//! 提供统一的数据库操作接口，屏蔽 SQLite 与 PostgreSQL 的实现差异。
//! 适配器只在调用者借到的连接上执行语句，不持有连接。

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::QuickPoolResult;
use crate::model::ModelMeta;
use crate::pool::DatabaseConnection;
use crate::types::{DataValue, DatabaseType, Record};

mod postgres;
pub mod query_builder;
mod sqlite;

pub use postgres::PostgresAdapter;
pub use query_builder::{SqlParam, SqlQueryBuilder, SqlStatement};
pub use sqlite::SqliteAdapter;

/// 数据库适配器trait，定义统一的数据库操作接口
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    /// 建表（已存在时跳过），并为外键列建立索引
    async fn create_table(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
    ) -> QuickPoolResult<()>;

    /// 插入一条记录，返回主键
    async fn insert(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        record: &Record,
    ) -> QuickPoolResult<i64>;

    /// 在一个事务中插入多条记录，按输入顺序返回主键；任一条失败则整体回滚
    async fn insert_many(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        records: &[Record],
    ) -> QuickPoolResult<Vec<i64>>;

    async fn find_by_id(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        id: i64,
    ) -> QuickPoolResult<Option<Record>>;

    /// `WHERE id IN (...)`，结果按主键升序，不保证与输入顺序一致
    async fn find_by_ids(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        ids: &[i64],
    ) -> QuickPoolResult<Vec<Record>>;

    /// `WHERE column IN (...)`
    async fn find_by_column_in(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        column: &str,
        values: &[DataValue],
    ) -> QuickPoolResult<Vec<Record>>;

    /// 返回受影响行数
    async fn update_by_id(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        id: i64,
        patch: &Record,
    ) -> QuickPoolResult<u64>;

    /// 在一个事务中应用多个补丁，返回受影响行数之和；任一条失败则整体回滚
    async fn update_many(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        patches: &[(i64, Record)],
    ) -> QuickPoolResult<u64>;

    async fn delete_by_id(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        id: i64,
    ) -> QuickPoolResult<bool>;

    /// 按等值条件计数
    async fn count(
        &self,
        connection: &mut DatabaseConnection,
        meta: &ModelMeta,
        criteria: &[(String, DataValue)],
    ) -> QuickPoolResult<i64>;
}

/// 根据数据库类型创建适配器
pub fn create_adapter(db_type: DatabaseType) -> Arc<dyn DatabaseAdapter> {
    match db_type {
        DatabaseType::SQLite => Arc::new(SqliteAdapter::new()),
        DatabaseType::PostgreSQL => Arc::new(PostgresAdapter::new()),
    }
}
