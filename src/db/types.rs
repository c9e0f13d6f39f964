//! Column type mapping.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the declared column type into a logical category
//! 2. Backend-specific decoders extract a [`Value`] for that category
//!
//! A column decodes as `Value::Bool` only when its declared type is a
//! boolean (or MySQL `BIT`); every other integer column decodes as
//! `Value::Int`, even when it holds 0 or 1.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Value};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use uuid::Uuid;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    UnsignedInteger,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    DateTime,
    DateTimeTz,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.trim().to_lowercase();

    if lower.is_empty() || lower == "null" {
        return TypeCategory::Unknown;
    }

    // Boolean before integer: MySQL reports TINYINT(1) as BOOLEAN
    if lower == "bool" || lower == "boolean" || lower == "bit" {
        return TypeCategory::Boolean;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    // Temporal types, most specific first ("datetime" contains "time")
    match lower.as_str() {
        "timestamptz" | "timestamp with time zone" => return TypeCategory::DateTimeTz,
        // MySQL TIMESTAMP is stored in UTC
        "timestamp" if db == DatabaseType::MySQL => return TypeCategory::DateTimeTz,
        "timestamp" | "timestamp without time zone" | "datetime" => {
            return TypeCategory::DateTime;
        }
        "date" => return TypeCategory::Date,
        "time" | "time without time zone" => return TypeCategory::Time,
        _ => {}
    }

    // "interval" and "point" contain "int" but are not integers
    if lower == "interval" || lower == "point" {
        return TypeCategory::Unknown;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") {
        if lower.contains("unsigned") {
            return TypeCategory::UnsignedInteger;
        }
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

fn decode_err(idx: usize, err: impl std::fmt::Display) -> DbError {
    DbError::decode(idx, err.to_string())
}

/// Collect every column of every row into a flat buffer.
pub(crate) fn collect_rows<R, F>(rows: &[R], decode: F) -> DbResult<Option<crate::db::RawResult>>
where
    R: Row,
    F: Fn(&R, usize, &str) -> DbResult<Value>,
{
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let columns: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();
    let type_names: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.type_info().name().to_string())
        .collect();

    let mut values = Vec::with_capacity(rows.len() * columns.len());
    for row in rows {
        for (idx, type_name) in type_names.iter().enumerate() {
            values.push(decode(row, idx, type_name)?);
        }
    }
    Ok(Some(crate::db::RawResult::new(columns, values, rows.len())))
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

pub(crate) mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, type_name: &str) -> DbResult<Value> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }

        match categorize_type(type_name, DatabaseType::MySQL) {
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Integer => get::<i64>(row, idx).map(Value::Int),
            TypeCategory::UnsignedInteger => decode_unsigned(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Decimal => get::<BigDecimal>(row, idx).map(Value::Decimal),
            TypeCategory::Binary => get::<Vec<u8>>(row, idx).map(Value::Bytes),
            TypeCategory::Json => {
                get::<serde_json::Value>(row, idx).map(|v| Value::Text(v.to_string()))
            }
            TypeCategory::Date => get::<NaiveDate>(row, idx).map(Value::Date),
            TypeCategory::Time => get::<NaiveTime>(row, idx).map(Value::Time),
            TypeCategory::DateTime => get::<NaiveDateTime>(row, idx).map(Value::DateTime),
            TypeCategory::DateTimeTz => get::<DateTime<Utc>>(row, idx)
                .map(|v| Value::DateTimeTz(v.fixed_offset())),
            _ => decode_text(row, idx),
        }
    }

    fn get<'r, T>(row: &'r MySqlRow, idx: usize) -> DbResult<T>
    where
        T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
    {
        row.try_get::<T, _>(idx).map_err(|e| decode_err(idx, e))
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<bool, _>(idx) {
            return Ok(Value::Bool(v));
        }
        // BIT(1) arrives as an unsigned integer
        get::<u64>(row, idx).map(|v| Value::Bool(v != 0))
    }

    fn decode_unsigned(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        let v = get::<u64>(row, idx)?;
        Ok(match i64::try_from(v) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Decimal(BigDecimal::from(v)),
        })
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(Value::Float(v));
        }
        get::<f32>(row, idx).map(|v| Value::Float(f64::from(v)))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(Value::Text(v));
        }
        get::<Vec<u8>>(row, idx).map(Value::Bytes)
    }
}

pub(crate) mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> DbResult<Value> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }

        match categorize_type(type_name, DatabaseType::PostgreSQL) {
            TypeCategory::Boolean => get::<bool>(row, idx).map(Value::Bool),
            TypeCategory::Integer | TypeCategory::UnsignedInteger => {
                decode_integer(row, idx, type_name)
            }
            TypeCategory::Float => decode_float(row, idx, type_name),
            TypeCategory::Decimal => get::<BigDecimal>(row, idx).map(Value::Decimal),
            TypeCategory::Binary => get::<Vec<u8>>(row, idx).map(Value::Bytes),
            TypeCategory::Json => {
                get::<serde_json::Value>(row, idx).map(|v| Value::Text(v.to_string()))
            }
            TypeCategory::Uuid => get::<Uuid>(row, idx).map(Value::Uuid),
            TypeCategory::Date => get::<NaiveDate>(row, idx).map(Value::Date),
            TypeCategory::Time => get::<NaiveTime>(row, idx).map(Value::Time),
            TypeCategory::DateTime => get::<NaiveDateTime>(row, idx).map(Value::DateTime),
            TypeCategory::DateTimeTz => get::<DateTime<Utc>>(row, idx)
                .map(|v| Value::DateTimeTz(v.fixed_offset())),
            _ => get::<String>(row, idx).map(Value::Text),
        }
    }

    fn get<'r, T>(row: &'r PgRow, idx: usize) -> DbResult<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<T, _>(idx).map_err(|e| decode_err(idx, e))
    }

    fn decode_integer(row: &PgRow, idx: usize, type_name: &str) -> DbResult<Value> {
        match type_name.to_uppercase().as_str() {
            "INT2" | "SMALLINT" | "SMALLSERIAL" => {
                get::<i16>(row, idx).map(|v| Value::Int(v.into()))
            }
            "INT4" | "INT" | "INTEGER" | "SERIAL" => {
                get::<i32>(row, idx).map(|v| Value::Int(v.into()))
            }
            _ => get::<i64>(row, idx).map(Value::Int),
        }
    }

    fn decode_float(row: &PgRow, idx: usize, type_name: &str) -> DbResult<Value> {
        match type_name.to_uppercase().as_str() {
            "FLOAT4" | "REAL" => get::<f32>(row, idx).map(|v| Value::Float(f64::from(v))),
            _ => get::<f64>(row, idx).map(Value::Float),
        }
    }
}

pub(crate) mod sqlite {
    use super::*;
    use crate::db::params::{SQLITE_DATE_FORMAT, SQLITE_DATETIME_FORMAT, SQLITE_TIME_FORMAT};
    use std::str::FromStr;

    /// Decode by declared type where SQLite cannot tell us, otherwise by the
    /// runtime storage class of the value.
    pub fn decode_column(row: &SqliteRow, idx: usize, type_name: &str) -> DbResult<Value> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let storage = raw.type_info().name().to_uppercase();

        match categorize_type(type_name, DatabaseType::SQLite) {
            TypeCategory::Boolean => get::<bool>(row, idx).map(Value::Bool),
            TypeCategory::Decimal => decode_decimal(row, idx, &storage),
            TypeCategory::Uuid => decode_uuid(row, idx, &storage),
            TypeCategory::Date if storage == "TEXT" => {
                parse_text(row, idx, |s| NaiveDate::parse_from_str(s, SQLITE_DATE_FORMAT))
                    .map(Value::Date)
            }
            TypeCategory::Time if storage == "TEXT" => {
                parse_text(row, idx, |s| NaiveTime::parse_from_str(s, SQLITE_TIME_FORMAT))
                    .map(Value::Time)
            }
            TypeCategory::DateTime if storage == "TEXT" => parse_text(row, idx, |s| {
                NaiveDateTime::parse_from_str(s, SQLITE_DATETIME_FORMAT)
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
            })
            .map(Value::DateTime),
            TypeCategory::DateTimeTz if storage == "TEXT" => {
                parse_text(row, idx, DateTime::parse_from_rfc3339).map(Value::DateTimeTz)
            }
            _ => decode_storage(row, idx, &storage),
        }
    }

    fn get<'r, T>(row: &'r SqliteRow, idx: usize) -> DbResult<T>
    where
        T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        row.try_get::<T, _>(idx).map_err(|e| decode_err(idx, e))
    }

    fn parse_text<T, E: std::fmt::Display>(
        row: &SqliteRow,
        idx: usize,
        parse: impl FnOnce(&str) -> Result<T, E>,
    ) -> DbResult<T> {
        let text = get::<String>(row, idx)?;
        parse(&text).map_err(|e| decode_err(idx, format!("{e}: '{text}'")))
    }

    fn decode_storage(row: &SqliteRow, idx: usize, storage: &str) -> DbResult<Value> {
        match storage {
            "INTEGER" => get::<i64>(row, idx).map(Value::Int),
            "REAL" => get::<f64>(row, idx).map(Value::Float),
            "BLOB" => get::<Vec<u8>>(row, idx).map(Value::Bytes),
            _ => get::<String>(row, idx).map(Value::Text),
        }
    }

    fn decode_decimal(row: &SqliteRow, idx: usize, storage: &str) -> DbResult<Value> {
        match storage {
            "INTEGER" => get::<i64>(row, idx).map(|v| Value::Decimal(BigDecimal::from(v))),
            "REAL" => {
                let v = get::<f64>(row, idx)?;
                BigDecimal::from_str(&v.to_string())
                    .map(Value::Decimal)
                    .map_err(|e| decode_err(idx, e))
            }
            _ => parse_text(row, idx, BigDecimal::from_str).map(Value::Decimal),
        }
    }

    fn decode_uuid(row: &SqliteRow, idx: usize, storage: &str) -> DbResult<Value> {
        if storage == "BLOB" {
            let bytes = get::<Vec<u8>>(row, idx)?;
            return Uuid::from_slice(&bytes)
                .map(Value::Uuid)
                .map_err(|e| decode_err(idx, e));
        }
        parse_text(row, idx, Uuid::parse_str).map(Value::Uuid)
    }
}
