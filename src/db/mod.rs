//! Database access layer.
//!
//! - The driver seam and the default sqlx-backed driver
//! - Parameter binding and column type mappings
//! - Connections, transactions and the connection pool

pub mod connection;
pub mod driver;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod sqlx_driver;
pub mod transaction;
pub mod types;

pub use connection::{Connection, connect, connect_with};
pub use driver::{Driver, DriverConnection, RawResult, TxControl, execute_status};
pub use pool::{Pool, PoolStatus, PooledConnection, create_pool, create_pool_with};
pub use sqlx_driver::SqlxDriver;
pub use transaction::Transaction;
pub use types::{TypeCategory, categorize_type};
