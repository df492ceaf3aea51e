//! 模型定义系统模块
//!
//! 通过结构体描述表结构，仓储层依据元数据建表、校验与转换记录

pub mod field_types;
pub mod traits;

pub use field_types::{
    FieldDefinition, FieldType, ID_FIELD, ModelMeta, Relation, boolean_field, datetime_field,
    float_field, integer_field, json_field, reference_field, string_field, text_field,
};
pub use traits::Model;
