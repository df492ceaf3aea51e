//! PostgreSQL适配器辅助工具函数

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgConnection, Postgres, Row, TypeInfo};

use crate::adapter::query_builder::{SqlParam, SqlStatement};
use crate::error::{QuickPoolResult, map_sqlx_error};
use crate::model::{FieldType, ID_FIELD, ModelMeta};
use crate::pool::DatabaseConnection;
use crate::quick_error;
use crate::types::{DataValue, Record};

pub(crate) type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// 取出 PostgreSQL 原生连接
pub(crate) fn postgres_conn(conn: &mut DatabaseConnection) -> QuickPoolResult<&mut PgConnection> {
    match conn {
        DatabaseConnection::PostgreSQL(conn) => Ok(conn),
        other => Err(quick_error!(
            config,
            format!("PostgreSQL适配器收到 {} 连接", other.database_type())
        )),
    }
}

/// 绑定一个参数
///
/// PostgreSQL 对参数做严格的类型推断，NULL 必须按列类型绑定
fn bind_param<'q>(query: PgQuery<'q>, param: &SqlParam) -> PgQuery<'q> {
    if matches!(param.field_type, FieldType::Json) {
        return if param.value.is_null() {
            query.bind(Option::<JsonValue>::None)
        } else {
            query.bind(param.value.to_json_value())
        };
    }
    match &param.value {
        DataValue::Null => match param.field_type {
            FieldType::Integer | FieldType::Reference { .. } => query.bind(Option::<i64>::None),
            FieldType::Float => query.bind(Option::<f64>::None),
            FieldType::Boolean => query.bind(Option::<bool>::None),
            FieldType::DateTime => query.bind(Option::<DateTime<Utc>>::None),
            _ => query.bind(Option::<String>::None),
        },
        DataValue::Bool(b) => query.bind(*b),
        // 整数写入浮点列时显式转换，避免 int8 与 float8 的比较歧义
        DataValue::Int(i) if matches!(param.field_type, FieldType::Float) => query.bind(*i as f64),
        DataValue::Int(i) => query.bind(*i),
        DataValue::Float(f) => query.bind(*f),
        DataValue::String(s) => query.bind(s.clone()),
        DataValue::Bytes(bytes) => query.bind(bytes.clone()),
        DataValue::DateTime(dt) => query.bind(*dt),
        DataValue::Uuid(uuid) => query.bind(*uuid),
        DataValue::Json(json) => query.bind(json.clone()),
    }
}

pub(crate) fn build_query(statement: &SqlStatement) -> PgQuery<'_> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.sql), bind_param)
}

/// 执行语句，返回受影响行数
pub(crate) async fn execute(
    conn: &mut PgConnection,
    statement: &SqlStatement,
    context: &str,
) -> QuickPoolResult<u64> {
    rat_logger::debug!("执行PostgreSQL语句: {}", statement.sql);
    let result = build_query(statement)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error(context, e))?;
    Ok(result.rows_affected())
}

/// 执行查询，按元数据解码全部行
pub(crate) async fn fetch_records(
    conn: &mut PgConnection,
    meta: &ModelMeta,
    statement: &SqlStatement,
    context: &str,
) -> QuickPoolResult<Vec<Record>> {
    rat_logger::debug!("执行PostgreSQL查询: {}", statement.sql);
    let rows = build_query(statement)
        .fetch_all(conn)
        .await
        .map_err(|e| map_sqlx_error(context, e))?;
    rows.iter().map(|row| row_to_record(row, meta)).collect()
}

/// 执行带 `RETURNING "id"` 的插入，返回生成的主键
pub(crate) async fn fetch_ids(
    conn: &mut PgConnection,
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

/// 将PostgreSQL行转换为记录
///
/// 已知列按字段类型解码；未知列按列的 PostgreSQL 类型名解码
pub(crate) fn row_to_record(row: &PgRow, meta: &ModelMeta) -> QuickPoolResult<Record> {
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
            None => decode_by_type_name(row, name, column.type_info().name()),
        };
        record.insert(name.to_string(), value);
    }
    Ok(record)
}

fn decode_typed(row: &PgRow, name: &str, field_type: &FieldType) -> QuickPoolResult<DataValue> {
    let context = format!("解码PostgreSQL列 {}", name);
    let value = match field_type {
        FieldType::Integer | FieldType::Reference { .. } => row
            .try_get::<Option<i64>, _>(name)
            .map(|v| v.map_or(DataValue::Null, DataValue::Int)),
        FieldType::Float => row
            .try_get::<Option<f64>, _>(name)
            .map(|v| v.map_or(DataValue::Null, DataValue::Float)),
        FieldType::Boolean => row
            .try_get::<Option<bool>, _>(name)
            .map(|v| v.map_or(DataValue::Null, DataValue::Bool)),
        FieldType::String | FieldType::Text => row
            .try_get::<Option<String>, _>(name)
            .map(|v| v.map_or(DataValue::Null, DataValue::String)),
        FieldType::DateTime => row
            .try_get::<Option<DateTime<Utc>>, _>(name)
            .map(|v| v.map_or(DataValue::Null, DataValue::DateTime)),
        FieldType::Json => row
            .try_get::<Option<JsonValue>, _>(name)
            .map(|v| v.map_or(DataValue::Null, DataValue::Json)),
    };
    value.map_err(|e| map_sqlx_error(&context, e))
}

fn decode_by_type_name(row: &PgRow, name: &str, type_name: &str) -> DataValue {
    let value = match type_name {
        "INT2" => row
            .try_get::<Option<i16>, _>(name)
            .map(|v| v.map(|i| DataValue::Int(i64::from(i)))),
        "INT4" => row
            .try_get::<Option<i32>, _>(name)
            .map(|v| v.map(|i| DataValue::Int(i64::from(i)))),
        "INT8" => row.try_get::<Option<i64>, _>(name).map(|v| v.map(DataValue::Int)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(name)
            .map(|v| v.map(|f| DataValue::Float(f64::from(f)))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(name).map(|v| v.map(DataValue::Float)),
        "BOOL" => row.try_get::<Option<bool>, _>(name).map(|v| v.map(DataValue::Bool)),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(name)
            .map(|v| v.map(DataValue::DateTime)),
        "JSON" | "JSONB" => row
            .try_get::<Option<JsonValue>, _>(name)
            .map(|v| v.map(DataValue::Json)),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .map(|v| v.map(DataValue::Uuid)),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(name)
            .map(|v| v.map(DataValue::Bytes)),
        _ => row.try_get::<Option<String>, _>(name).map(|v| v.map(DataValue::String)),
    };
    match value {
        Ok(Some(value)) => value,
        Ok(None) => DataValue::Null,
        Err(e) => {
            rat_logger::debug!("无法解码PostgreSQL列 {} ({}): {}", name, type_name, e);
            DataValue::Null
        }
    }
}
