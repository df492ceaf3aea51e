//! Model trait 定义模块
//!
//! 模型通过 serde 与 [`Record`] 互转，转换时按字段类型归一化：
//! RFC 3339 字符串转为日期时间，SQLite 的 0/1 转回布尔值，JSON 文本解析为文档。

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::QuickPoolResult;
use crate::model::field_types::{FieldType, ID_FIELD, ModelMeta};
use crate::quick_error;
use crate::types::data_value::json_value_to_data_value;
use crate::types::{DataValue, Record};

/// 模型特征
///
/// 所有模型都必须实现这个特征
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 获取模型元数据
    fn meta() -> ModelMeta;

    /// 主键，未保存的模型返回 None
    fn id(&self) -> Option<i64>;

    /// 获取表名
    fn table_name() -> String {
        Self::meta().table_name
    }

    /// 转换为记录
    fn to_record(&self) -> QuickPoolResult<Record> {
        let meta = Self::meta();
        let json = serde_json::to_value(self)?;
        let JsonValue::Object(object) = json else {
            return Err(quick_error!(serialization, "模型必须序列化为对象"));
        };

        let mut record = Record::with_capacity(object.len());
        for (key, value) in object {
            if key == ID_FIELD {
                if !value.is_null() {
                    record.insert(key, json_value_to_data_value(value));
                }
                continue;
            }
            let field_type = meta.field(&key).map(|f| &f.field_type);
            record.insert(key, normalize_value(field_type, value));
        }
        Ok(record)
    }

    /// 从记录构建模型
    fn from_record(record: Record) -> QuickPoolResult<Self>
    where
        Self: Sized,
    {
        let meta = Self::meta();
        let mut object = serde_json::Map::with_capacity(record.len());
        for (key, value) in record {
            let field_type = meta.field(&key).map(|f| &f.field_type);
            object.insert(key, denormalize_value(field_type, value));
        }
        serde_json::from_value(JsonValue::Object(object)).map_err(|e| {
            quick_error!(
                serialization,
                format!("记录转换为模型 {} 失败: {}", meta.table_name, e)
            )
        })
    }
}

fn normalize_value(field_type: Option<&FieldType>, value: JsonValue) -> DataValue {
    match (field_type, value) {
        (_, JsonValue::Null) => DataValue::Null,
        (Some(FieldType::Json), value) => DataValue::Json(value),
        (Some(FieldType::DateTime), JsonValue::String(s)) => {
            match DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => DataValue::DateTime(dt.with_timezone(&Utc)),
                Err(_) => DataValue::String(s),
            }
        }
        (Some(FieldType::Float), JsonValue::Number(n)) => match n.as_f64() {
            Some(f) => DataValue::Float(f),
            None => DataValue::Json(JsonValue::Number(n)),
        },
        (_, value) => json_value_to_data_value(value),
    }
}

fn denormalize_value(field_type: Option<&FieldType>, value: DataValue) -> JsonValue {
    match (field_type, value) {
        (Some(FieldType::Boolean), DataValue::Int(i)) => JsonValue::Bool(i != 0),
        (Some(FieldType::Json), DataValue::String(s)) => {
            serde_json::from_str(&s).unwrap_or(JsonValue::String(s))
        }
        (_, value) => value.to_json_value(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field_types::{boolean_field, datetime_field, json_field, string_field};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: Option<i64>,
        title: String,
        pinned: bool,
        tags: Vec<String>,
        written_at: DateTime<Utc>,
    }

    impl Model for Note {
        fn meta() -> ModelMeta {
            ModelMeta::new(
                "notes",
                vec![
                    string_field("title").required(),
                    boolean_field("pinned"),
                    json_field("tags"),
                    datetime_field("written_at"),
                ],
            )
        }

        fn id(&self) -> Option<i64> {
            self.id
        }
    }

    fn note() -> Note {
        Note {
            id: None,
            title: "旧港".to_string(),
            pinned: true,
            tags: vec!["雾".to_string(), "灯塔".to_string()],
            written_at: DateTime::parse_from_rfc3339("2024-03-01T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn test_to_record_normalizes_by_field_type() {
        let record = note().to_record().unwrap();
        assert!(!record.contains_key("id"));
        assert_eq!(record["pinned"], DataValue::Bool(true));
        assert!(matches!(record["written_at"], DataValue::DateTime(_)));
        assert_eq!(record["tags"], DataValue::Json(serde_json::json!(["雾", "灯塔"])));
        Note::meta().validate_record(&record).unwrap();
    }

    #[test]
    fn test_from_record_accepts_sqlite_storage_forms() {
        let mut record = Record::new();
        record.insert("id".into(), DataValue::Int(9));
        record.insert("title".into(), DataValue::String("旧港".into()));
        record.insert("pinned".into(), DataValue::Int(1));
        record.insert("tags".into(), DataValue::String(r#"["雾","灯塔"]"#.into()));
        record.insert(
            "written_at".into(),
            DataValue::String("2024-03-01T08:30:00+00:00".into()),
        );

        let restored = Note::from_record(record).unwrap();
        assert_eq!(restored, Note { id: Some(9), ..note() });
    }
}
