//! Error types for sluice.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Usage errors (closed connection, closed pool, invalid transaction state) are
//! raised locally; everything the driver reports is passed through unchanged.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Failed to decode column {column}: {message}")]
    Decode { column: usize, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a transaction state error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a column decode error.
    pub fn decode(column: usize, message: impl Into<String>) -> Self {
        Self::Decode {
            column,
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Usage errors are caused by the caller, not by the database.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::PoolClosed | Self::Transaction { .. }
        )
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Suggestion for a server-side error, keyed on the SQLSTATE class.
fn sql_state_suggestion(code: Option<&str>) -> &'static str {
    match code.map(|c| c.get(..2).unwrap_or(c)) {
        Some("23") => "The statement violates a constraint; check keys and NOT NULL columns",
        Some("42") => "Check the SQL syntax and that referenced tables and columns exist",
        Some("40") => "The transaction was rolled back by the server; retry it",
        Some("28") => "Check the user name and password",
        Some("08") => "The server dropped the session; reconnect",
        _ => "Check the statement and its parameters",
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                let suggestion = sql_state_suggestion(code.as_deref());
                DbError::database(db_err.message(), code, suggestion)
            }
            sqlx::Error::Configuration(msg) => DbError::connection(
                format!("Invalid connection string: {msg}"),
                "Check the DSN scheme, host and options",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {io_err}"),
                "Check that the database server is reachable",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {tls_err}"),
                "Check the TLS mode and certificates, or build with a TLS feature",
            ),
            sqlx::Error::Protocol(msg) => {
                DbError::connection(format!("Protocol error: {msg}"), "Reconnect to the database")
            }
            sqlx::Error::WorkerCrashed => {
                DbError::connection("SQLite worker thread crashed", "Reconnect to the database")
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::decode(index.parse().unwrap_or(usize::MAX), source.to_string())
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                DbError::decode(index, format!("row has only {len} columns"))
            }
            other => DbError::internal(other.to_string()),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
