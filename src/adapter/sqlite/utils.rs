//! SQLite适配器辅助方法模块

use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqliteConnection};

use crate::adapter::query_builder::{SqlParam, SqlStatement};
use crate::error::{QuickPoolResult, map_sqlx_error};
use crate::model::{FieldType, ID_FIELD, ModelMeta};
use crate::pool::DatabaseConnection;
use crate::quick_error;
use crate::types::data_value::parse_json_string_to_data_value;
use crate::types::{DataValue, Record};

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// 取出 SQLite 原生连接
pub(crate) fn sqlite_conn(conn: &mut DatabaseConnection) -> QuickPoolResult<&mut SqliteConnection> {
    match conn {
        DatabaseConnection::SQLite(conn) => Ok(conn),
        other => Err(quick_error!(
            config,
            format!("SQLite适配器收到 {} 连接", other.database_type())
        )),
    }
}

/// 绑定一个参数
///
/// 布尔值存为 0/1，日期时间存为 RFC 3339 文本，JSON 存为文本
fn bind_param<'q>(query: SqliteQuery<'q>, param: &SqlParam) -> SqliteQuery<'q> {
    if matches!(param.field_type, FieldType::Json) && !param.value.is_null() {
        return query.bind(param.value.to_json_value().to_string());
    }
    match &param.value {
        DataValue::Null => match param.field_type {
            FieldType::Integer | FieldType::Boolean | FieldType::Reference { .. } => {
                query.bind(Option::<i64>::None)
            }
            FieldType::Float => query.bind(Option::<f64>::None),
            _ => query.bind(Option::<String>::None),
        },
        DataValue::Bool(b) => query.bind(i64::from(*b)),
        DataValue::Int(i) => query.bind(*i),
        DataValue::Float(f) => query.bind(*f),
        DataValue::String(s) => query.bind(s.clone()),
        DataValue::Bytes(bytes) => query.bind(bytes.clone()),
        DataValue::DateTime(dt) => query.bind(dt.to_rfc3339()),
        DataValue::Uuid(uuid) => query.bind(uuid.to_string()),
        DataValue::Json(json) => query.bind(json.to_string()),
    }
}

pub(crate) fn build_query(statement: &SqlStatement) -> SqliteQuery<'_> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.sql), bind_param)
}

/// 执行语句，返回受影响行数
pub(crate) async fn execute(
    conn: &mut SqliteConnection,
    statement: &SqlStatement,
    context: &str,
) -> QuickPoolResult<u64> {
    rat_logger::debug!("执行SQLite语句: {}", statement.sql);
    let result = build_query(statement)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error(context, e))?;
    Ok(result.rows_affected())
}

/// 执行查询，按元数据解码全部行
pub(crate) async fn fetch_records(
    conn: &mut SqliteConnection,
    meta: &ModelMeta,
    statement: &SqlStatement,
    context: &str,
) -> QuickPoolResult<Vec<Record>> {
    rat_logger::debug!("执行SQLite查询: {}", statement.sql);
    let rows = build_query(statement)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error(context, e))?;
    rows.iter().map(|row| row_to_record(row, meta)).collect()
}

/// 执行带 `RETURNING "id"` 的插入，返回生成的主键
pub(crate) async fn fetch_ids(
    conn: &mut SqliteConnection,
    statement: &SqlStatement,
    context: &str,
) -> QuickPoolResult<Vec<i64>> {
    let rows = build_query(statement)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error(context, e))?;
    rows.iter()
        .map(|row| {
            row.try_get::<i64, _>(ID_FIELD)
                .map_err(|e| map_sqlx_error(context, e))
        })
        .collect()
}

/// 将sqlx的行转换为记录
///
/// 已知列按字段类型解码；未知列依次尝试文本、整数、浮点、二进制
pub(crate) fn row_to_record(row: &SqliteRow, meta: &ModelMeta) -> QuickPoolResult<Record> {
    let mut record = Record::with_capacity(row.columns().len());
    for column in row.columns() {
        let name = column.name();
        let field_type = if name == ID_FIELD {
            Some(FieldType::Integer)
        } else {
            meta.field(name).map(|f| f.field_type.clone())
        };
        let value = match field_type {
            Some(field_type) => decode_typed(row, name, &field_type)?,
            None => decode_untyped(row, name),
        };
        record.insert(name.to_string(), value);
    }
    Ok(record)
}

fn decode_typed(row: &SqliteRow, name: &str, field_type: &FieldType) -> QuickPoolResult<DataValue> {
    let context = format!("解码SQLite列 {}", name);
    let value = match field_type {
        FieldType::Integer | FieldType::Reference { .. } => row
            .try_get::<Option<i64>, _>(name)
            .map(|v| v.map_or(DataValue::Null, DataValue::Int)),
        FieldType::Float => row
            .try_get::<Option<f64>, _>(name)
            .map(|v| v.map_or(DataValue::Null, DataValue::Float)),
        FieldType::Boolean => row
            .try_get::<Option<i64>, _>(name)
            .map(|v| v.map_or(DataValue::Null, |i| DataValue::Bool(i != 0))),
        FieldType::String | FieldType::Text => row
            .try_get::<Option<String>, _>(name)
            .map(|v| v.map_or(DataValue::Null, DataValue::String)),
        FieldType::DateTime => row.try_get::<Option<String>, _>(name).map(|v| match v {
            Some(s) => match DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => DataValue::DateTime(dt.with_timezone(&Utc)),
                Err(_) => DataValue::String(s),
            },
            None => DataValue::Null,
        }),
        FieldType::Json => row.try_get::<Option<String>, _>(name).map(|v| match v {
            Some(s) => serde_json::from_str(&s)
                .map(DataValue::Json)
                .unwrap_or(DataValue::String(s)),
            None => DataValue::Null,
        }),
    };
    value.map_err(|e| map_sqlx_error(&context, e))
}

fn decode_untyped(row: &SqliteRow, name: &str) -> DataValue {
    if let Ok(value) = row.try_get::<Option<String>, _>(name) {
        value.map_or(DataValue::Null, parse_json_string_to_data_value)
    } else if let Ok(value) = row.try_get::<Option<i64>, _>(name) {
        value.map_or(DataValue::Null, DataValue::Int)
    } else if let Ok(value) = row.try_get::<Option<f64>, _>(name) {
        value.map_or(DataValue::Null, DataValue::Float)
    } else if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(name) {
        value.map_or(DataValue::Null, DataValue::Bytes)
    } else {
        DataValue::Null
    }
}
