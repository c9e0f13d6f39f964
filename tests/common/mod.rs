//! Scripted in-memory driver for pool, connection and transaction tests.
//!
//! Statements understood by [`FakeConnection`]:
//! - `GENERATE <rows> <cols>`: rows of integers `r * cols + c`, columns `col0..`
//! - `EMPTY`: no rows
//! - `SLEEP <ms>`: waits, then returns no rows
//! - anything else passed to `query`: one row echoing the parameters
//! - any statement or parameter containing `FAIL` fails with a database error

#![allow(dead_code)]

use async_trait::async_trait;
use rand::Rng;
use sluice::db::execute_status;
use sluice::{DbError, DbResult, Driver, DriverConnection, RawResult, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeState {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_connect: AtomicBool,
    /// Random 0..3ms sleep inside every query
    pub jitter: AtomicBool,
    /// Sleep applied inside every `connect`
    pub connect_delay: Mutex<Option<Duration>>,
    /// Control statements containing this text fail
    pub fail_control: Mutex<Option<String>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub log: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct FakeDriver {
    pub state: Arc<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_jitter(&self, jitter: bool) {
        self.state.jitter.store(jitter, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_control_containing(&self, text: &str) {
        *self.state.fail_control.lock().unwrap() = Some(text.to_string());
    }

    /// Statements seen so far, in order.
    pub fn log(&self) -> Vec<String> {
        self.state.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn connect(&self, _dsn: &str) -> DbResult<Box<dyn DriverConnection>> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(DbError::connection("fake connect refused", "try again"));
        }
        let delay = *self.state.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeConnection {
    state: Arc<FakeState>,
}

impl FakeConnection {
    fn record(&self, sql: &str) {
        self.state.log.lock().unwrap().push(sql.to_string());
    }

    fn check_failure(sql: &str, params: &[Value]) -> DbResult<()> {
        let failing_param = params
            .iter()
            .any(|p| p.as_str().is_some_and(|s| s.contains("FAIL")));
        if sql.contains("FAIL") || failing_param {
            return Err(DbError::database("forced failure", None, "fake driver"));
        }
        Ok(())
    }

    async fn enter(&self) {
        let now = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(now, Ordering::SeqCst);
        if self.state.jitter.load(Ordering::SeqCst) {
            let ms = rand::thread_rng().gen_range(0..3u64);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn leave(&self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DriverConnection for FakeConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> DbResult<Option<RawResult>> {
        self.record(sql);
        self.enter().await;
        if let Some(ms) = sql.strip_prefix("SLEEP ").and_then(|ms| ms.trim().parse().ok()) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        let result = Self::check_failure(sql, params).map(|()| scripted_rows(sql, params));
        self.leave();
        result
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<String> {
        self.record(sql);
        Self::check_failure(sql, params)?;
        Ok(execute_status(sql, 1))
    }

    async fn execute_raw(&mut self, sql: &str) -> DbResult<()> {
        self.record(sql);
        let fail = self.state.fail_control.lock().unwrap().clone();
        if fail.is_some_and(|text| sql.contains(&text)) {
            return Err(DbError::connection("control statement failed", "fake driver"));
        }
        Ok(())
    }

    async fn close(&mut self) -> DbResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn scripted_rows(sql: &str, params: &[Value]) -> Option<RawResult> {
    let words: Vec<&str> = sql.split_whitespace().collect();
    match words.as_slice() {
        ["EMPTY"] => None,
        ["GENERATE", rows, cols] => {
            let rows: usize = rows.parse().ok()?;
            let cols: usize = cols.parse().ok()?;
            if rows == 0 {
                return None;
            }
            let columns = (0..cols).map(|c| format!("col{c}")).collect();
            let values = (0..rows * cols).map(|i| Value::Int(i as i64)).collect();
            Some(RawResult::new(columns, values, rows))
        }
        _ if params.is_empty() => None,
        _ => {
            let columns = (0..params.len()).map(|c| format!("col{c}")).collect();
            Some(RawResult::new(columns, params.to_vec(), 1))
        }
    }
}
