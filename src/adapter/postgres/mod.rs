//! PostgreSQL数据库适配器

mod operations;
pub(crate) mod utils;

use crate::adapter::query_builder::SqlQueryBuilder;
use crate::types::DatabaseType;

/// PostgreSQL适配器
///
/// 主键为 BIGSERIAL，JSON 列为 JSONB，日期时间列为 TIMESTAMPTZ
#[derive(Debug, Clone, Copy)]
pub struct PostgresAdapter {
    pub(crate) builder: SqlQueryBuilder,
}

impl PostgresAdapter {
    pub fn new() -> Self {
        Self {
            builder: SqlQueryBuilder::new(DatabaseType::PostgreSQL),
        }
    }
}

impl Default for PostgresAdapter {
    fn default() -> Self {
        Self::new()
    }
}
