//! Parameter binding for sqlx queries.
//!
//! Each backend gets its own binder because the native type coverage
//! differs: SQLite has no decimal, UUID or temporal storage classes and
//! MySQL has no UUID type.

use crate::models::Value;
use chrono::Utc;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

pub(crate) const SQLITE_DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const SQLITE_TIME_FORMAT: &str = "%H:%M:%S%.f";
pub(crate) const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q Value,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(v.clone()),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::DateTimeTz(v) => query.bind(v.with_timezone(&Utc)),
        // MySQL has no UUID type; the canonical text form is what callers
        // store in CHAR(36) columns.
        Value::Uuid(v) => query.bind(v.hyphenated().to_string()),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(v.clone()),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::DateTimeTz(v) => query.bind(*v),
        Value::Uuid(v) => query.bind(*v),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        // Stored as text so no precision is lost to REAL
        Value::Decimal(v) => query.bind(v.to_string()),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Date(v) => query.bind(v.format(SQLITE_DATE_FORMAT).to_string()),
        Value::Time(v) => query.bind(v.format(SQLITE_TIME_FORMAT).to_string()),
        Value::DateTime(v) => query.bind(v.format(SQLITE_DATETIME_FORMAT).to_string()),
        Value::DateTimeTz(v) => query.bind(v.to_rfc3339()),
        Value::Uuid(v) => query.bind(v.hyphenated().to_string()),
    }
}
