//! Integration tests for a single connection, using the scripted driver.

mod common;

use common::FakeDriver;
use sluice::{Connection, DbError, Value, connect_with, params};

async fn open(driver: &FakeDriver) -> Connection {
    connect_with(driver, "fake://db").await.unwrap()
}

#[tokio::test]
async fn test_fetch_shapes_rows() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let rows = conn.fetch("GENERATE 4 3", &[]).await.unwrap();
    assert_eq!(rows.len(), 4);
    for (r, row) in rows.iter().enumerate() {
        assert_eq!(row.len(), 3);
        assert_eq!(row.keys(), vec!["col0", "col1", "col2"]);
        for c in 0..3 {
            assert_eq!(row[c], Value::Int((r * 3 + c) as i64));
        }
    }
}

#[tokio::test]
async fn test_empty_results() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    assert!(conn.fetch("EMPTY", &[]).await.unwrap().is_empty());
    assert!(conn.fetchrow("EMPTY", &[]).await.unwrap().is_none());
    assert!(conn.fetchval("EMPTY", &[], 0).await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetchrow_and_fetchval() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let row = conn
        .fetchrow("SELECT ?, ?", &params![10, "ten"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["col1"], Value::from("ten"));

    let second = conn
        .fetchval("SELECT ?, ?", &params![10, "ten"], 1)
        .await
        .unwrap();
    assert_eq!(second, Some(Value::from("ten")));

    let null = conn
        .fetchval("SELECT ?", &params![None::<i64>], 0)
        .await
        .unwrap();
    assert_eq!(null, Some(Value::Null));
}

#[tokio::test]
async fn test_fetchval_missing_column_is_error() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let err = conn.fetchval("SELECT ?", &params![1], 5).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_execute_status() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let status = conn
        .execute("INSERT INTO t VALUES (?)", &params![1])
        .await
        .unwrap();
    assert_eq!(status, "1 row(s) affected");
    let status = conn.execute("CREATE TABLE t (a INT)", &[]).await.unwrap();
    assert_eq!(status, "OK");
}

#[tokio::test]
async fn test_executemany_stops_at_first_failure() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let sets = vec![params![1, "a"], params![2, "FAIL"], params![3, "c"]];
    let err = conn
        .executemany("INSERT INTO t VALUES (?, ?)", &sets)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database { .. }));
    assert_eq!(driver.log().len(), 2);
}

#[tokio::test]
async fn test_driver_errors_propagate_unchanged() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let err = conn.fetch("SELECT FAIL", &[]).await.unwrap_err();
    assert_eq!(err.to_string(), "Database error: forced failure");
    // The connection is still usable
    assert!(conn.fetchrow("SELECT ?", &params![1]).await.unwrap().is_some());
}

#[tokio::test]
async fn test_operations_after_close_fail() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    conn.close().await.unwrap();
    assert!(conn.is_closed());

    assert!(matches!(
        conn.fetch("SELECT ?", &params![1]).await,
        Err(DbError::ConnectionClosed)
    ));
    assert!(matches!(
        conn.fetchrow("SELECT ?", &params![1]).await,
        Err(DbError::ConnectionClosed)
    ));
    assert!(matches!(
        conn.fetchval("SELECT ?", &params![1], 0).await,
        Err(DbError::ConnectionClosed)
    ));
    assert!(matches!(
        conn.execute("DELETE FROM t", &[]).await,
        Err(DbError::ConnectionClosed)
    ));
    assert!(matches!(
        conn.executemany("DELETE FROM t", &[params![]]).await,
        Err(DbError::ConnectionClosed)
    ));
    let mut tx = conn.transaction();
    assert!(matches!(tx.start().await, Err(DbError::ConnectionClosed)));

    // Second close is a no-op and the handle is released only once
    conn.close().await.unwrap();
    assert_eq!(driver.closes(), 1);
    assert!(driver.log().is_empty());
}

#[tokio::test]
async fn test_concurrent_calls_on_one_connection_are_serialized() {
    let driver = FakeDriver::new();
    driver.set_jitter(true);
    let conn = open(&driver).await;

    let param_sets: Vec<Vec<Value>> = (0..20i64).map(|i| params![i]).collect();
    let calls = param_sets.iter().map(|p| conn.fetchval("SELECT ?", p, 0));
    let results = futures_util::future::join_all(calls).await;

    assert_eq!(driver.max_active(), 1);
    let values: Vec<i64> = results
        .into_iter()
        .map(|r| r.unwrap().and_then(|v| v.as_i64()).unwrap())
        .collect();
    assert_eq!(values, (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_connection_ids_are_unique() {
    let driver = FakeDriver::new();
    let a = open(&driver).await;
    let b = open(&driver).await;
    assert_ne!(a.id(), b.id());
}
