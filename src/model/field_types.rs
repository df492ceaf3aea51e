//! 字段类型定义模块
//!
//! 描述表结构：列名、列类型、约束。`id` 主键列由适配器隐式生成，不出现在字段列表中。

use serde::{Deserialize, Serialize};

use crate::error::QuickPoolResult;
use crate::quick_error;
use crate::types::DataValue;

/// 主键列名
pub const ID_FIELD: &str = "id";

/// 字段类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// 64 位整数
    Integer,
    /// 双精度浮点
    Float,
    /// 布尔值（SQLite 中以 0/1 存储）
    Boolean,
    /// 短字符串
    String,
    /// 长文本
    Text,
    /// UTC 日期时间
    DateTime,
    /// JSON 文档（SQLite 中以文本存储）
    Json,
    /// 指向另一张表主键的外键
    Reference { target_table: String },
}

impl FieldType {
    /// 值的类型是否能存入该列
    fn accepts(&self, value: &DataValue) -> bool {
        matches!(
            (self, value),
            (_, DataValue::Null)
                | (FieldType::Integer | FieldType::Reference { .. }, DataValue::Int(_))
                | (FieldType::Float, DataValue::Float(_) | DataValue::Int(_))
                | (FieldType::Boolean, DataValue::Bool(_))
                | (FieldType::String | FieldType::Text, DataValue::String(_))
                | (FieldType::DateTime, DataValue::DateTime(_))
                | (FieldType::Json, _)
        )
    }
}

/// 字段定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    /// 是否必填（NOT NULL）
    pub required: bool,
    /// 是否唯一
    pub unique: bool,
    /// 是否建立索引，外键列总是建立索引
    pub indexed: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
            indexed: false,
        }
    }

    /// 设置为必填字段
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// 设置为唯一字段
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// 设置为索引字段
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// 校验字段值
    pub fn validate(&self, value: &DataValue) -> QuickPoolResult<()> {
        if value.is_null() {
            if self.required {
                return Err(quick_error!(validation, &self.name, "必填字段不能为空"));
            }
            return Ok(());
        }
        if !self.field_type.accepts(value) {
            return Err(quick_error!(
                validation,
                &self.name,
                format!("类型不匹配: 期望 {:?}，实际 {}", self.field_type, value.type_name())
            ));
        }
        Ok(())
    }

    pub fn needs_index(&self) -> bool {
        self.indexed || matches!(self.field_type, FieldType::Reference { .. })
    }
}

/// 模型元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    /// 表名
    pub table_name: String,
    /// 按列顺序排列的字段定义
    pub fields: Vec<FieldDefinition>,
}

impl ModelMeta {
    pub fn new(table_name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            table_name: table_name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 校验一条记录：未知列报错，已知列按类型与必填约束检查
    pub fn validate_record(&self, record: &crate::types::Record) -> QuickPoolResult<()> {
        for key in record.keys() {
            if key != ID_FIELD && self.field(key).is_none() {
                return Err(quick_error!(
                    validation,
                    key,
                    format!("表 {} 中不存在该字段", self.table_name)
                ));
            }
        }
        for field in &self.fields {
            field.validate(record.get(&field.name).unwrap_or(&DataValue::Null))?;
        }
        Ok(())
    }
}

/// 父子表关系：子表中 `foreign_key` 列指向父表主键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    /// 子表名
    pub table: &'static str,
    /// 子表中的外键列
    pub foreign_key: &'static str,
}

/// 便捷函数：创建字符串字段
pub fn string_field(name: &str) -> FieldDefinition {
    FieldDefinition::new(name, FieldType::String)
}

/// 便捷函数：创建长文本字段
pub fn text_field(name: &str) -> FieldDefinition {
    FieldDefinition::new(name, FieldType::Text)
}

/// 便捷函数：创建整数字段
pub fn integer_field(name: &str) -> FieldDefinition {
    FieldDefinition::new(name, FieldType::Integer)
}

/// 便捷函数：创建浮点数字段
pub fn float_field(name: &str) -> FieldDefinition {
    FieldDefinition::new(name, FieldType::Float)
}

/// 便捷函数：创建布尔字段
pub fn boolean_field(name: &str) -> FieldDefinition {
    FieldDefinition::new(name, FieldType::Boolean)
}

/// 便捷函数：创建日期时间字段
pub fn datetime_field(name: &str) -> FieldDefinition {
    FieldDefinition::new(name, FieldType::DateTime)
}

/// 便捷函数：创建 JSON 字段
pub fn json_field(name: &str) -> FieldDefinition {
    FieldDefinition::new(name, FieldType::Json)
}

/// 便捷函数：创建外键字段
pub fn reference_field(name: &str, target_table: &str) -> FieldDefinition {
    FieldDefinition::new(
        name,
        FieldType::Reference {
            target_table: target_table.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Record;

    fn meta() -> ModelMeta {
        ModelMeta::new(
            "plots",
            vec![
                reference_field("author_id", "authors").required(),
                string_field("title").required(),
                float_field("rating"),
            ],
        )
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut record = Record::new();
        record.insert("author_id".into(), DataValue::Int(1));
        record.insert("title".into(), DataValue::String("潮汐".into()));
        record.insert("subtitle".into(), DataValue::String("x".into()));
        let err = meta().validate_record(&record).unwrap_err();
        assert!(matches!(err, crate::error::QuickPoolError::ValidationError { ref field, .. } if field == "subtitle"));
    }

    #[test]
    fn test_required_and_type_checks() {
        let mut record = Record::new();
        record.insert("author_id".into(), DataValue::Int(1));
        assert!(meta().validate_record(&record).is_err());

        record.insert("title".into(), DataValue::String("潮汐".into()));
        record.insert("rating".into(), DataValue::Int(4));
        assert!(meta().validate_record(&record).is_ok());

        record.insert("rating".into(), DataValue::Bool(true));
        assert!(meta().validate_record(&record).is_err());
    }

    #[test]
    fn test_reference_columns_are_indexed() {
        let meta = meta();
        assert!(meta.field("author_id").unwrap().needs_index());
        assert!(!meta.field("title").unwrap().needs_index());
    }
}
