//! SQLite数据库适配器

mod operations;
pub(crate) mod utils;

use crate::adapter::query_builder::SqlQueryBuilder;
use crate::types::DatabaseType;

/// SQLite适配器
///
/// 布尔值以 0/1 存储，日期时间和 JSON 以文本存储，读取时按字段类型还原
#[derive(Debug, Clone, Copy)]
pub struct SqliteAdapter {
    pub(crate) builder: SqlQueryBuilder,
}

impl SqliteAdapter {
    pub fn new() -> Self {
        Self {
            builder: SqlQueryBuilder::new(DatabaseType::SQLite),
        }
    }
}

impl Default for SqliteAdapter {
    fn default() -> Self {
        Self::new()
    }
}
