//! sluice: asynchronous SQL client access layer.
//!
//! Connections, transactions and a bounded connection pool on top of an
//! injectable driver. The default driver speaks SQLite, PostgreSQL and
//! MySQL through sqlx.
//!
//! ```no_run
//! use sluice::{PoolOptions, create_pool, params};
//!
//! # async fn demo() -> sluice::DbResult<()> {
//! let pool = create_pool("sqlite::memory:", PoolOptions::new().max_size(4)).await?;
//! let answer = pool.fetchval("SELECT ? + 1", &params![41], 0).await?;
//! assert_eq!(answer.and_then(|v| v.as_i64()), Some(42));
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, PoolOptions};
pub use db::{
    Connection, Driver, DriverConnection, Pool, PoolStatus, PooledConnection, RawResult,
    SqlxDriver, Transaction, TxControl, connect, connect_with, create_pool, create_pool_with,
};
pub use error::{DbError, DbResult};
pub use models::{ColumnIndex, DatabaseType, Record, RecordKey, TransactionState, Value};
