//! SQL查询构建器模块
//!
//! 根据模型元数据生成参数化 SQL。标识符经 [`DatabaseSecurityValidator`] 校验并加引号，
//! 值全部以占位符绑定：SQLite 使用 `?`，PostgreSQL 使用 `$n`。

use crate::error::QuickPoolResult;
use crate::model::{FieldType, ID_FIELD, ModelMeta};
use crate::quick_error;
use crate::security::DatabaseSecurityValidator;
use crate::types::{DataValue, DatabaseType, Record};

/// SQLite 单条语句的参数上限（SQLITE_MAX_VARIABLE_NUMBER 的保守取值）
pub const SQLITE_MAX_PARAMS: usize = 999;
/// PostgreSQL 协议层的参数上限
pub const POSTGRES_MAX_PARAMS: usize = 65_535;

/// 待绑定的参数，附带目标列类型以便绑定带类型的 NULL
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParam {
    pub value: DataValue,
    pub field_type: FieldType,
}

impl SqlParam {
    pub fn new(value: DataValue, field_type: FieldType) -> Self {
        Self { value, field_type }
    }

    pub fn id(id: i64) -> Self {
        Self::new(DataValue::Int(id), FieldType::Integer)
    }
}

/// 一条已构建的语句
#[derive(Debug, Clone)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

/// SQL查询构建器
#[derive(Debug, Clone, Copy)]
pub struct SqlQueryBuilder {
    db_type: DatabaseType,
    validator: DatabaseSecurityValidator,
}

impl SqlQueryBuilder {
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            validator: DatabaseSecurityValidator::new(db_type),
        }
    }

    /// 单条语句允许的最大参数个数
    pub fn max_params(&self) -> usize {
        match self.db_type {
            DatabaseType::SQLite => SQLITE_MAX_PARAMS,
            DatabaseType::PostgreSQL => POSTGRES_MAX_PARAMS,
        }
    }

    /// 第 `index` 个占位符（从 1 开始）
    fn placeholder(&self, index: usize) -> String {
        match self.db_type {
            DatabaseType::SQLite => "?".to_string(),
            DatabaseType::PostgreSQL => format!("${}", index),
        }
    }

    fn table(&self, meta: &ModelMeta) -> QuickPoolResult<String> {
        self.validator.get_safe_table_identifier(&meta.table_name)
    }

    fn column(&self, name: &str) -> QuickPoolResult<String> {
        self.validator.get_safe_field_identifier(name)
    }

    fn column_type(&self, field_type: &FieldType) -> &'static str {
        match (self.db_type, field_type) {
            (DatabaseType::SQLite, FieldType::Integer | FieldType::Reference { .. }) => "INTEGER",
            (DatabaseType::SQLite, FieldType::Float) => "REAL",
            (DatabaseType::SQLite, FieldType::Boolean) => "INTEGER",
            (DatabaseType::SQLite, _) => "TEXT",
            (DatabaseType::PostgreSQL, FieldType::Integer | FieldType::Reference { .. }) => {
                "BIGINT"
            }
            (DatabaseType::PostgreSQL, FieldType::Float) => "DOUBLE PRECISION",
            (DatabaseType::PostgreSQL, FieldType::Boolean) => "BOOLEAN",
            (DatabaseType::PostgreSQL, FieldType::String | FieldType::Text) => "TEXT",
            (DatabaseType::PostgreSQL, FieldType::DateTime) => "TIMESTAMPTZ",
            (DatabaseType::PostgreSQL, FieldType::Json) => "JSONB",
        }
    }

    /// 建表与建索引语句
    pub fn create_table(&self, meta: &ModelMeta) -> QuickPoolResult<Vec<String>> {
        let table = self.table(meta)?;
        let id_column = match self.db_type {
            DatabaseType::SQLite => "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT",
            DatabaseType::PostgreSQL => "\"id\" BIGSERIAL PRIMARY KEY",
        };

        let mut columns = vec![id_column.to_string()];
        for field in &meta.fields {
            let mut column = format!(
                "{} {}",
                self.column(&field.name)?,
                self.column_type(&field.field_type)
            );
            if field.required {
                column.push_str(" NOT NULL");
            }
            if field.unique {
                column.push_str(" UNIQUE");
            }
            if let FieldType::Reference { target_table } = &field.field_type {
                column.push_str(&format!(
                    " REFERENCES {}(\"id\")",
                    self.validator.get_safe_table_identifier(target_table)?
                ));
            }
            columns.push(column);
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            table,
            columns.join(", ")
        )];
        for field in meta.fields.iter().filter(|f| f.needs_index() && !f.unique) {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{}_{}\" ON {} ({})",
                meta.table_name,
                field.name,
                table,
                self.column(&field.name)?
            ));
        }
        Ok(statements)
    }

    /// 单行插入时每批最多容纳的行数
    pub fn rows_per_insert(&self, meta: &ModelMeta) -> usize {
        (self.max_params() / meta.fields.len().max(1)).max(1)
    }

    /// 多行插入，返回生成的主键
    ///
    /// 列按元数据顺序排列，记录中缺失的列写入 NULL。`with_id` 为真时显式写入主键。
    pub fn insert(
        &self,
        meta: &ModelMeta,
        records: &[&Record],
        with_id: bool,
    ) -> QuickPoolResult<SqlStatement> {
        if records.is_empty() {
            return Err(quick_error!(validation, "records", "插入记录不能为空"));
        }

        let mut columns: Vec<(&str, FieldType)> = Vec::with_capacity(meta.fields.len() + 1);
        if with_id {
            columns.push((ID_FIELD, FieldType::Integer));
        }
        columns.extend(
            meta.fields
                .iter()
                .map(|f| (f.name.as_str(), f.field_type.clone())),
        );

        let quoted = columns
            .iter()
            .map(|(name, _)| self.column(name))
            .collect::<QuickPoolResult<Vec<_>>>()?;

        let mut params = Vec::with_capacity(records.len() * columns.len());
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let mut placeholders = Vec::with_capacity(columns.len());
            for (name, field_type) in &columns {
                let value = record.get(*name).cloned().unwrap_or(DataValue::Null);
                params.push(SqlParam::new(value, field_type.clone()));
                placeholders.push(self.placeholder(params.len()));
            }
            rows.push(format!("({})", placeholders.join(", ")));
        }

        Ok(SqlStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES {} RETURNING \"id\"",
                self.table(meta)?,
                quoted.join(", "),
                rows.join(", ")
            ),
            params,
        })
    }

    /// `SELECT * ... WHERE column IN (...)`，按主键升序
    pub fn select_where_in(
        &self,
        meta: &ModelMeta,
        column: &str,
        values: &[DataValue],
    ) -> QuickPoolResult<SqlStatement> {
        let field_type = self.field_type(meta, column)?;
        let placeholders: Vec<String> = (1..=values.len()).map(|i| self.placeholder(i)).collect();
        Ok(SqlStatement {
            sql: format!(
                "SELECT * FROM {} WHERE {} IN ({}) ORDER BY \"id\"",
                self.table(meta)?,
                self.column(column)?,
                placeholders.join(", ")
            ),
            params: values
                .iter()
                .map(|v| SqlParam::new(v.clone(), field_type.clone()))
                .collect(),
        })
    }

    /// 按主键更新；补丁列按元数据顺序排列，相同列集合生成相同的语句
    pub fn update_by_id(
        &self,
        meta: &ModelMeta,
        id: i64,
        patch: &Record,
    ) -> QuickPoolResult<SqlStatement> {
        if patch.is_empty() {
            return Err(quick_error!(validation, "patch", "更新内容不能为空"));
        }
        if patch.contains_key(ID_FIELD) {
            return Err(quick_error!(validation, ID_FIELD, "主键不能被更新"));
        }
        if let Some(unknown) = patch.keys().find(|k| meta.field(k).is_none()) {
            return Err(quick_error!(
                validation,
                unknown,
                format!("表 {} 中不存在该字段", meta.table_name)
            ));
        }

        let mut assignments = Vec::with_capacity(patch.len());
        let mut params = Vec::with_capacity(patch.len() + 1);
        for field in meta.fields.iter() {
            if let Some(value) = patch.get(&field.name) {
                field.validate(value)?;
                params.push(SqlParam::new(value.clone(), field.field_type.clone()));
                assignments.push(format!(
                    "{} = {}",
                    self.column(&field.name)?,
                    self.placeholder(params.len())
                ));
            }
        }
        params.push(SqlParam::id(id));

        Ok(SqlStatement {
            sql: format!(
                "UPDATE {} SET {} WHERE \"id\" = {}",
                self.table(meta)?,
                assignments.join(", "),
                self.placeholder(params.len())
            ),
            params,
        })
    }

    pub fn delete_by_id(&self, meta: &ModelMeta, id: i64) -> QuickPoolResult<SqlStatement> {
        Ok(SqlStatement {
            sql: format!(
                "DELETE FROM {} WHERE \"id\" = {}",
                self.table(meta)?,
                self.placeholder(1)
            ),
            params: vec![SqlParam::id(id)],
        })
    }

    /// 按等值条件计数，NULL 条件生成 `IS NULL`
    pub fn count(
        &self,
        meta: &ModelMeta,
        criteria: &[(String, DataValue)],
    ) -> QuickPoolResult<SqlStatement> {
        let mut clauses = Vec::with_capacity(criteria.len());
        let mut params = Vec::with_capacity(criteria.len());
        for (column, value) in criteria {
            let field_type = self.field_type(meta, column)?;
            if value.is_null() {
                clauses.push(format!("{} IS NULL", self.column(column)?));
            } else {
                params.push(SqlParam::new(value.clone(), field_type));
                clauses.push(format!(
                    "{} = {}",
                    self.column(column)?,
                    self.placeholder(params.len())
                ));
            }
        }

        let mut sql = format!("SELECT COUNT(*) AS \"count\" FROM {}", self.table(meta)?);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        Ok(SqlStatement { sql, params })
    }

    /// 把 PostgreSQL 的主键序列推进到 `MAX(id) + 1`
    pub fn sync_id_sequence(&self, meta: &ModelMeta) -> QuickPoolResult<SqlStatement> {
        if self.db_type != DatabaseType::PostgreSQL {
            return Err(quick_error!(unsupported_db, self.db_type));
        }
        let table = self.table(meta)?;
        Ok(SqlStatement {
            sql: format!(
                "SELECT setval(pg_get_serial_sequence('{}', 'id'), COALESCE((SELECT MAX(\"id\") FROM {}), 0) + 1, false)",
                table, table
            ),
            params: Vec::new(),
        })
    }

    fn field_type(&self, meta: &ModelMeta, column: &str) -> QuickPoolResult<FieldType> {
        if column == ID_FIELD {
            return Ok(FieldType::Integer);
        }
        meta.field(column)
            .map(|f| f.field_type.clone())
            .ok_or_else(|| {
                quick_error!(
                    validation,
                    column,
                    format!("表 {} 中不存在该字段", meta.table_name)
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{reference_field, string_field};

    fn plots() -> ModelMeta {
        ModelMeta::new(
            "plots",
            vec![
                reference_field("author_id", "authors").required(),
                string_field("title").required(),
            ],
        )
    }

    fn record(author_id: i64, title: &str) -> Record {
        let mut record = Record::new();
        record.insert("author_id".into(), DataValue::Int(author_id));
        record.insert("title".into(), DataValue::String(title.into()));
        record
    }

    #[test]
    fn test_multi_row_insert_placeholders() {
        let a = record(1, "序章");
        let b = record(1, "终章");
        let pg = SqlQueryBuilder::new(DatabaseType::PostgreSQL)
            .insert(&plots(), &[&a, &b], false)
            .unwrap();
        assert_eq!(
            pg.sql,
            "INSERT INTO \"plots\" (\"author_id\", \"title\") VALUES ($1, $2), ($3, $4) RETURNING \"id\""
        );
        assert_eq!(pg.params.len(), 4);
        assert_eq!(pg.params[3].value, DataValue::String("终章".into()));

        let lite = SqlQueryBuilder::new(DatabaseType::SQLite)
            .insert(&plots(), &[&a], true)
            .unwrap();
        assert_eq!(
            lite.sql,
            "INSERT INTO \"plots\" (\"id\", \"author_id\", \"title\") VALUES (?, ?, ?) RETURNING \"id\""
        );
        assert_eq!(lite.params[0].value, DataValue::Null);
    }

    #[test]
    fn test_update_statement_shape_is_stable() {
        let builder = SqlQueryBuilder::new(DatabaseType::PostgreSQL);
        let mut patch = Record::new();
        patch.insert("title".into(), DataValue::String("新题".into()));
        patch.insert("author_id".into(), DataValue::Int(3));
        let stmt = builder.update_by_id(&plots(), 7, &patch).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"plots\" SET \"author_id\" = $1, \"title\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(stmt.params[2].value, DataValue::Int(7));

        patch.insert("id".into(), DataValue::Int(8));
        assert!(builder.update_by_id(&plots(), 7, &patch).is_err());
    }

    #[test]
    fn test_count_with_null_criteria() {
        let stmt = SqlQueryBuilder::new(DatabaseType::SQLite)
            .count(
                &plots(),
                &[
                    ("author_id".to_string(), DataValue::Int(1)),
                    ("title".to_string(), DataValue::Null),
                ],
            )
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) AS \"count\" FROM \"plots\" WHERE \"author_id\" = ? AND \"title\" IS NULL"
        );
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_create_table_indexes_references() {
        let ddl = SqlQueryBuilder::new(DatabaseType::PostgreSQL)
            .create_table(&plots())
            .unwrap();
        assert!(ddl[0].contains("\"id\" BIGSERIAL PRIMARY KEY"));
        assert!(ddl[0].contains("\"author_id\" BIGINT NOT NULL REFERENCES \"authors\"(\"id\")"));
        assert_eq!(
            ddl[1],
            "CREATE INDEX IF NOT EXISTS \"idx_plots_author_id\" ON \"plots\" (\"author_id\")"
        );
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let builder = SqlQueryBuilder::new(DatabaseType::SQLite);
        assert!(builder
            .select_where_in(&plots(), "missing", &[DataValue::Int(1)])
            .is_err());
    }
}
