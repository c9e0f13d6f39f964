//! Integration tests for transaction state handling, using the scripted driver.

mod common;

use common::FakeDriver;
use sluice::{Connection, DbError, TransactionState, connect_with, params};

async fn open(driver: &FakeDriver) -> Connection {
    connect_with(driver, "fake://db").await.unwrap()
}

#[tokio::test]
async fn test_start_and_commit_issue_control_statements() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let mut tx = conn.transaction();
    assert_eq!(tx.state(), TransactionState::NotStarted);
    tx.start().await.unwrap();
    assert!(tx.is_active());
    tx.execute("INSERT INTO t VALUES (?)", &params![1]).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(tx.state(), TransactionState::Committed);

    assert_eq!(
        driver.log(),
        vec![
            "BEGIN TRANSACTION",
            "INSERT INTO t VALUES (?)",
            "COMMIT TRANSACTION"
        ]
    );
}

#[tokio::test]
async fn test_rollback() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let mut tx = conn.transaction();
    tx.start().await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(tx.state(), TransactionState::RolledBack);
    assert_eq!(driver.log().last().unwrap(), "ROLLBACK TRANSACTION");
}

#[tokio::test]
async fn test_invalid_state_transitions() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let mut tx = conn.transaction();
    assert!(matches!(tx.commit().await, Err(DbError::Transaction { .. })));
    assert!(matches!(tx.rollback().await, Err(DbError::Transaction { .. })));

    tx.start().await.unwrap();
    let err = tx.start().await.unwrap_err();
    assert_eq!(err.to_string(), "Transaction error: Transaction already started");
    assert!(err.is_usage_error());

    tx.commit().await.unwrap();
    let err = tx.commit().await.unwrap_err();
    assert_eq!(err.to_string(), "Transaction error: Transaction not active");
    assert!(matches!(tx.rollback().await, Err(DbError::Transaction { .. })));
    assert!(matches!(tx.start().await, Err(DbError::Transaction { .. })));

    // Only BEGIN and COMMIT reached the driver
    assert_eq!(driver.log().len(), 2);
}

#[tokio::test]
async fn test_failed_commit_still_finishes() {
    let driver = FakeDriver::new();
    driver.fail_control_containing("COMMIT");
    let conn = open(&driver).await;

    let mut tx = conn.transaction();
    tx.start().await.unwrap();
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));
    assert_eq!(tx.state(), TransactionState::Committed);
    assert!(matches!(tx.rollback().await, Err(DbError::Transaction { .. })));
    drop(tx);
    // Finished transactions do not taint the connection
    assert!(!conn.is_tainted());
}

#[tokio::test]
async fn test_failed_begin_leaves_not_started() {
    let driver = FakeDriver::new();
    driver.fail_control_containing("BEGIN");
    let conn = open(&driver).await;

    let mut tx = conn.transaction();
    assert!(tx.start().await.is_err());
    assert_eq!(tx.state(), TransactionState::NotStarted);
}

#[tokio::test]
async fn test_run_commits_on_ok() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let value = conn
        .transaction()
        .run(async |tx| {
            tx.execute("INSERT INTO t VALUES (?)", &params![1]).await?;
            Ok::<_, DbError>(42)
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(driver.log().last().unwrap(), "COMMIT TRANSACTION");
}

#[tokio::test]
async fn test_run_rolls_back_on_err() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let result: Result<(), DbError> = conn
        .transaction()
        .run(async |tx| {
            tx.execute("INSERT INTO t VALUES (?)", &params![1]).await?;
            Err(DbError::internal("forced"))
        })
        .await;

    assert!(matches!(result, Err(DbError::Internal { .. })));
    let log = driver.log();
    assert_eq!(log.last().unwrap(), "ROLLBACK TRANSACTION");
    assert!(!log.iter().any(|s| s.starts_with("COMMIT")));
    assert!(!conn.is_tainted());
}

#[tokio::test]
async fn test_run_is_noop_after_explicit_finish() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    conn.transaction()
        .run(async |tx| {
            tx.rollback().await?;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap();

    assert_eq!(
        driver.log(),
        vec!["BEGIN TRANSACTION", "ROLLBACK TRANSACTION"]
    );
}

#[tokio::test]
async fn test_run_propagates_rollback_failure() {
    let driver = FakeDriver::new();
    driver.fail_control_containing("ROLLBACK");
    let conn = open(&driver).await;

    let result: Result<(), DbError> = conn
        .transaction()
        .run(async |_tx| Err(DbError::internal("forced")))
        .await;

    assert!(matches!(result, Err(DbError::Connection { .. })));
}

#[tokio::test]
async fn test_run_with_custom_error_type() {
    #[derive(Debug)]
    enum AppError {
        Db(DbError),
        Rejected,
    }

    impl From<DbError> for AppError {
        fn from(e: DbError) -> Self {
            Self::Db(e)
        }
    }

    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let result: Result<(), AppError> = conn
        .transaction()
        .run(async |_tx| Err(AppError::Rejected))
        .await;
    assert!(matches!(result, Err(AppError::Rejected)));

    conn.close().await.unwrap();
    let result: Result<(), AppError> = conn.transaction().run(async |_tx| Ok(())).await;
    assert!(matches!(result, Err(AppError::Db(DbError::ConnectionClosed))));
}

#[tokio::test]
async fn test_dropping_active_transaction_taints_connection() {
    let driver = FakeDriver::new();
    let conn = open(&driver).await;

    let mut tx = conn.transaction();
    tx.start().await.unwrap();
    drop(tx);
    assert!(conn.is_tainted());
}
