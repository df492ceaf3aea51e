//! 标识符安全校验
//!
//! 表名和列名会被拼接进 SQL 文本，拼接前必须通过这里的校验并加上引号。
//! 值一律走参数绑定，不在此处理。

use crate::error::{QuickPoolError, QuickPoolResult};
use crate::types::DatabaseType;

/// 列名中不允许出现的关键字
const FIELD_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TABLE",
    "INDEX", "AND", "OR", "NOT", "NULL", "IS", "IN", "EXISTS", "BETWEEN", "LIKE", "UNION", "JOIN",
    "GROUP", "BY", "HAVING", "ORDER", "LIMIT", "OFFSET", "DISTINCT", "AS", "ON", "PRIMARY", "KEY",
    "FOREIGN", "REFERENCES", "CASE", "WHEN", "THEN", "ELSE", "END", "CAST", "RETURNING",
];

/// 表名中不允许出现的关键字
const TABLE_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TABLE",
    "INDEX", "DATABASE", "SCHEMA", "USER", "ROLE", "GRANT", "REVOKE", "COMMIT", "ROLLBACK",
    "TRANSACTION", "VIEW", "TRIGGER", "FUNCTION", "SEQUENCE", "CONSTRAINT", "ORDER", "GROUP",
];

/// 数据库标识符校验器
#[derive(Debug, Clone, Copy)]
pub struct DatabaseSecurityValidator {
    db_type: DatabaseType,
}

impl DatabaseSecurityValidator {
    pub fn new(db_type: DatabaseType) -> Self {
        Self { db_type }
    }

    /// 标识符最大长度：PostgreSQL 截断超过 63 字节的名字，SQLite 统一限制为 64
    fn max_len(&self) -> usize {
        match self.db_type {
            DatabaseType::PostgreSQL => 63,
            DatabaseType::SQLite => 64,
        }
    }

    /// 校验列名
    pub fn validate_field_name(&self, field_name: &str) -> QuickPoolResult<()> {
        self.validate_identifier(field_name, "字段名", FIELD_KEYWORDS)
    }

    /// 校验表名
    pub fn validate_table_name(&self, table_name: &str) -> QuickPoolResult<()> {
        self.validate_identifier(table_name, "表名", TABLE_KEYWORDS)
    }

    /// 校验列名并返回带引号的标识符
    pub fn get_safe_field_identifier(&self, field_name: &str) -> QuickPoolResult<String> {
        self.validate_field_name(field_name)?;
        Ok(quote(field_name))
    }

    /// 校验表名并返回带引号的标识符
    pub fn get_safe_table_identifier(&self, table_name: &str) -> QuickPoolResult<String> {
        self.validate_table_name(table_name)?;
        Ok(quote(table_name))
    }

    fn validate_identifier(
        &self,
        name: &str,
        kind: &str,
        keywords: &[&str],
    ) -> QuickPoolResult<()> {
        let Some(first) = name.chars().next() else {
            return Err(QuickPoolError::ValidationError {
                field: kind.to_string(),
                message: format!("{}不能为空", kind),
            });
        };

        if name.len() > self.max_len() {
            return Err(QuickPoolError::ValidationError {
                field: name.to_string(),
                message: format!("{}长度不能超过{}个字符", kind, self.max_len()),
            });
        }

        if first.is_ascii_digit() {
            return Err(QuickPoolError::ValidationError {
                field: name.to_string(),
                message: format!("{}不能以数字开头", kind),
            });
        }

        if let Some((i, ch)) = name
            .chars()
            .enumerate()
            .find(|(_, ch)| !ch.is_ascii_alphanumeric() && *ch != '_')
        {
            return Err(QuickPoolError::ValidationError {
                field: name.to_string(),
                message: format!("{}包含非法字符 '{}' 在位置 {}", kind, ch, i),
            });
        }

        let upper = name.to_ascii_uppercase();
        if keywords.contains(&upper.as_str()) {
            return Err(QuickPoolError::ValidationError {
                field: name.to_string(),
                message: format!("{}不能使用SQL关键字: {}", kind, name),
            });
        }

        Ok(())
    }
}

/// SQLite 与 PostgreSQL 都接受双引号标识符
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}
