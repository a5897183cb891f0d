//! Row decoding into JSON values.
//!
//! Column types are first classified into a [`TypeCategory`], then a
//! backend-specific decoder extracts the value. Decoding never fails: a value
//! that cannot be read is logged and returned as `null`.

use crate::models::{DatabaseType, Row as JsonRow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::types::{PgInterval, PgTimeTz};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};
use uuid::Uuid;

/// Logical category for a column or value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    /// Dates, times and timestamps, rendered as ISO 8601 strings.
    Temporal,
    /// PostgreSQL INTERVAL, rendered as an ISO 8601 duration.
    Interval,
    Uuid,
    Null,
}

const INTEGER_TYPES: &[&str] = &[
    "int", "int2", "int4", "int8", "integer", "tinyint", "smallint", "mediumint", "bigint",
    "serial", "smallserial", "bigserial",
];

/// Classify a driver type name.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_ascii_lowercase();
    let base = lower.trim_end_matches(" unsigned");

    if lower == "null" {
        return TypeCategory::Null;
    }
    if lower.contains("decimal") || lower.contains("numeric") {
        return if db == DatabaseType::SQLite {
            TypeCategory::Float
        } else {
            TypeCategory::Decimal
        };
    }
    if lower.starts_with("timestamp")
        || matches!(lower.as_str(), "datetime" | "date" | "time" | "timetz")
    {
        return TypeCategory::Temporal;
    }
    if lower == "interval" {
        return TypeCategory::Interval;
    }
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }
    if INTEGER_TYPES.contains(&base) {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    TypeCategory::Text
}

/// DECIMAL/NUMERIC read as its exact textual form.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        categorize_type(ty.name(), DatabaseType::MySQL) == TypeCategory::Decimal
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        <&str as Decode<sqlx::MySql>>::decode(value).map(|s| RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        categorize_type(ty.name(), DatabaseType::PostgreSQL) == TypeCategory::Decimal
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        <&str as Decode<sqlx::Postgres>>::decode(value).map(|s| RawDecimal(s.to_string()))
    }
}

/// Binary cells are returned base64 encoded.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn naive_datetime(v: NaiveDateTime) -> JsonValue {
    JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

/// `P{months}M{days}DT{seconds}S`, keeping each component's own sign.
fn interval_value(v: PgInterval) -> JsonValue {
    let seconds = v.microseconds as f64 / 1_000_000.0;
    JsonValue::String(format!("P{}M{}DT{}S", v.months, v.days, seconds))
}

/// Conversion of a driver row into a name-keyed JSON row.
pub trait RowToJson {
    fn column_names(&self) -> Vec<String>;
    fn to_row(&self) -> JsonRow;
}

macro_rules! impl_row_to_json {
    ($row:ty, $decoder:path) => {
        impl RowToJson for $row {
            fn column_names(&self) -> Vec<String> {
                self.columns().iter().map(|c| c.name().to_string()).collect()
            }

            fn to_row(&self) -> JsonRow {
                self.columns()
                    .iter()
                    .map(|col| (col.name().to_string(), $decoder(self, col.ordinal())))
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, mysql::decode_column);
impl_row_to_json!(PgRow, postgres::decode_column);
impl_row_to_json!(SqliteRow, sqlite::decode_column);

/// Decode a nullable cell, logging and yielding `null` on failure.
fn cell<'r, R, T>(row: &'r R, idx: usize, map: impl FnOnce(T) -> JsonValue) -> JsonValue
where
    R: Row,
    usize: sqlx::ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => map(v),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::warn!(column = idx, error = %e, "Failed to decode column");
            JsonValue::Null
        }
    }
}

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize) -> JsonValue {
        let type_name = row.columns()[idx].type_info().name();
        let unsigned = type_name.to_ascii_uppercase().contains("UNSIGNED");
        match categorize_type(type_name, DatabaseType::MySQL) {
            TypeCategory::Decimal => cell(row, idx, |v: RawDecimal| JsonValue::String(v.0)),
            TypeCategory::Integer if unsigned => cell(row, idx, |v: u64| JsonValue::from(v)),
            TypeCategory::Integer => cell(row, idx, |v: i64| JsonValue::from(v)),
            TypeCategory::Boolean => cell(row, idx, JsonValue::Bool),
            TypeCategory::Float => cell(row, idx, float_value),
            TypeCategory::Binary => cell(row, idx, |v: Vec<u8>| encode_binary(&v)),
            TypeCategory::Json => cell(row, idx, |v: JsonValue| v),
            TypeCategory::Temporal => match type_name {
                "TIMESTAMP" => cell(row, idx, |v: DateTime<Utc>| JsonValue::String(v.to_rfc3339())),
                "DATE" => cell(row, idx, |v: NaiveDate| JsonValue::String(v.to_string())),
                "TIME" => cell(row, idx, |v: NaiveTime| JsonValue::String(v.to_string())),
                _ => cell(row, idx, naive_datetime),
            },
            TypeCategory::Null => JsonValue::Null,
            TypeCategory::Text | TypeCategory::Interval | TypeCategory::Uuid => {
                cell(row, idx, JsonValue::String)
            }
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize) -> JsonValue {
        let type_name = row.columns()[idx].type_info().name();
        match (categorize_type(type_name, DatabaseType::PostgreSQL), type_name) {
            (TypeCategory::Integer, "INT2") => cell(row, idx, |v: i16| JsonValue::from(v)),
            (TypeCategory::Integer, "INT4") => cell(row, idx, |v: i32| JsonValue::from(v)),
            (TypeCategory::Integer, _) => cell(row, idx, |v: i64| JsonValue::from(v)),
            (TypeCategory::Float, "FLOAT4") => cell(row, idx, |v: f32| float_value(v.into())),
            (TypeCategory::Float, _) => cell(row, idx, float_value),
            (TypeCategory::Decimal, _) => cell(row, idx, |v: RawDecimal| JsonValue::String(v.0)),
            (TypeCategory::Boolean, _) => cell(row, idx, JsonValue::Bool),
            (TypeCategory::Binary, _) => cell(row, idx, |v: Vec<u8>| encode_binary(&v)),
            (TypeCategory::Json, _) => cell(row, idx, |v: JsonValue| v),
            (TypeCategory::Temporal, "TIMESTAMPTZ") => {
                cell(row, idx, |v: DateTime<Utc>| JsonValue::String(v.to_rfc3339()))
            }
            (TypeCategory::Temporal, "TIMESTAMP") => cell(row, idx, naive_datetime),
            (TypeCategory::Temporal, "DATE") => {
                cell(row, idx, |v: NaiveDate| JsonValue::String(v.to_string()))
            }
            (TypeCategory::Temporal, "TIMETZ") => {
                cell(row, idx, |v: PgTimeTz<NaiveTime, FixedOffset>| {
                    JsonValue::String(format!("{}{}", v.time, v.offset))
                })
            }
            (TypeCategory::Temporal, _) => {
                cell(row, idx, |v: NaiveTime| JsonValue::String(v.to_string()))
            }
            (TypeCategory::Interval, _) => cell(row, idx, interval_value),
            (TypeCategory::Uuid, _) => cell(row, idx, |v: Uuid| JsonValue::String(v.to_string())),
            (TypeCategory::Null, _) => JsonValue::Null,
            (TypeCategory::Text, _) => cell(row, idx, JsonValue::String),
        }
    }
}

mod sqlite {
    use super::*;

    /// SQLite is dynamically typed, so the stored value's own type decides.
    pub fn decode_column(row: &SqliteRow, idx: usize) -> JsonValue {
        let category = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(raw) => categorize_type(raw.type_info().name(), DatabaseType::SQLite),
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to read column");
                return JsonValue::Null;
            }
        };
        match category {
            TypeCategory::Integer | TypeCategory::Boolean => {
                cell(row, idx, |v: i64| JsonValue::from(v))
            }
            TypeCategory::Float | TypeCategory::Decimal => cell(row, idx, float_value),
            TypeCategory::Binary => cell(row, idx, |v: Vec<u8>| encode_binary(&v)),
            TypeCategory::Null => JsonValue::Null,
            TypeCategory::Text
            | TypeCategory::Json
            | TypeCategory::Temporal
            | TypeCategory::Interval
            | TypeCategory::Uuid => {
                cell(row, idx, JsonValue::String)
            }
        }
    }
}
