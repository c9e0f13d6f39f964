//! Data models for sluice.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod record;
pub mod value;

// Re-export commonly used types
pub use connection::{DatabaseType, TransactionState};
pub use record::{ColumnIndex, Record, RecordKey};
pub use value::Value;
