//! The driver seam.
//!
//! A [`Driver`] opens physical connections; a [`DriverConnection`] runs
//! statements on one of them and hands back raw column data. Everything
//! above this module ([`Connection`](crate::Connection), [`Pool`](crate::Pool))
//! talks to the database only through these two traits, so tests can swap
//! in a scripted driver.

use crate::error::{DbError, DbResult};
use crate::models::{ColumnIndex, Record, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens physical connections.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Open a new connection for `dsn`.
    ///
    /// Fails with a connection error on an unreachable host, rejected
    /// credentials or a malformed DSN.
    async fn connect(&self, dsn: &str) -> DbResult<Box<dyn DriverConnection>>;
}

#[async_trait]
impl<D: Driver + ?Sized> Driver for Arc<D> {
    async fn connect(&self, dsn: &str) -> DbResult<Box<dyn DriverConnection>> {
        (**self).connect(dsn).await
    }
}

/// One physical connection, owned exclusively by a single
/// [`Connection`](crate::Connection).
#[async_trait]
pub trait DriverConnection: Send {
    /// Run a row-returning statement.
    ///
    /// Returns `None` when the statement produced no rows.
    async fn query(&mut self, sql: &str, params: &[Value]) -> DbResult<Option<RawResult>>;

    /// Run a statement and return a human-readable status string.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<String>;

    /// Run `sql` once per parameter set, in order, stopping at the first
    /// failure.
    async fn execute_many(&mut self, sql: &str, param_sets: &[Vec<Value>]) -> DbResult<()> {
        for params in param_sets {
            self.execute(sql, params).await?;
        }
        Ok(())
    }

    /// Run a parameterless statement. Used for transaction control.
    async fn execute_raw(&mut self, sql: &str) -> DbResult<()>;

    /// Release the physical connection. Called at most once.
    async fn close(&mut self) -> DbResult<()>;

    /// The statement this backend uses for a transaction control step.
    fn control_sql(&self, control: TxControl) -> &'static str {
        control.default_sql()
    }
}

/// Transaction control steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxControl {
    Begin,
    Commit,
    Rollback,
}

impl TxControl {
    pub fn default_sql(self) -> &'static str {
        match self {
            Self::Begin => "BEGIN TRANSACTION",
            Self::Commit => "COMMIT TRANSACTION",
            Self::Rollback => "ROLLBACK TRANSACTION",
        }
    }
}

/// Raw result of a row-returning statement.
///
/// `values` is flat: row `r` occupies `values[r * col_count..(r + 1) * col_count]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
    pub row_count: usize,
    pub col_count: usize,
}

impl RawResult {
    pub fn new(columns: Vec<String>, values: Vec<Value>, row_count: usize) -> Self {
        let col_count = columns.len();
        Self {
            columns,
            values,
            row_count,
            col_count,
        }
    }

    /// Split the flat buffer into records sharing one column index.
    pub fn into_records(self) -> DbResult<Vec<Record>> {
        if self.columns.len() != self.col_count {
            return Err(DbError::internal(format!(
                "Driver reported {} columns but named {}",
                self.col_count,
                self.columns.len()
            )));
        }
        if self.values.len() != self.row_count * self.col_count {
            return Err(DbError::internal(format!(
                "Driver returned {} values for {} rows of {} columns",
                self.values.len(),
                self.row_count,
                self.col_count
            )));
        }
        if self.row_count == 0 {
            return Ok(Vec::new());
        }

        let columns = Arc::new(ColumnIndex::new(self.columns));
        let mut values = self.values.into_iter();
        (0..self.row_count)
            .map(|_| {
                let row: Vec<Value> = values.by_ref().take(self.col_count).collect();
                Record::new(Arc::clone(&columns), row)
            })
            .collect()
    }
}

/// Build the status string returned by `execute`.
///
/// Data-modifying statements report their affected row count; everything
/// else reports `OK`.
pub fn execute_status(sql: &str, rows_affected: u64) -> String {
    let verb = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match verb.as_str() {
        "INSERT" | "UPDATE" | "DELETE" | "MERGE" | "REPLACE" => {
            format!("{rows_affected} row(s) affected")
        }
        _ => "OK".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_status() {
        assert_eq!(execute_status("INSERT INTO t VALUES (1)", 1), "1 row(s) affected");
        assert_eq!(execute_status("  update t set a = 1", 3), "3 row(s) affected");
        assert_eq!(execute_status("delete from t", 0), "0 row(s) affected");
        assert_eq!(execute_status("CREATE TABLE t (a INT)", 0), "OK");
        assert_eq!(execute_status("", 0), "OK");
    }

    #[test]
    fn test_into_records_splits_rows() {
        let raw = RawResult::new(
            vec!["a".into(), "b".into()],
            vec![Value::Int(1), Value::from("x"), Value::Int(2), Value::Null],
            2,
        );
        let records = raw.into_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["a"], Value::Int(1));
        assert_eq!(records[0]["b"], Value::from("x"));
        assert_eq!(records[1]["a"], Value::Int(2));
        assert!(records[1]["b"].is_null());
    }

    #[test]
    fn test_into_records_rejects_short_buffer() {
        let raw = RawResult::new(vec!["a".into()], vec![Value::Int(1)], 2);
        assert!(raw.into_records().is_err());
    }

    #[test]
    fn test_default_control_sql() {
        assert_eq!(TxControl::Begin.default_sql(), "BEGIN TRANSACTION");
        assert_eq!(TxControl::Commit.default_sql(), "COMMIT TRANSACTION");
        assert_eq!(TxControl::Rollback.default_sql(), "ROLLBACK TRANSACTION");
    }
}
