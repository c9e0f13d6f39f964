//! The default driver, backed by single sqlx connections.
//!
//! The backend is chosen from the DSN scheme: `sqlite:`, `postgres://`
//! (or `postgresql://`) and `mysql://` (or `mariadb://`).

use super::driver::{Driver, DriverConnection, RawResult, TxControl, execute_status};
use super::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use super::types::{self, collect_rows};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Value};
use async_trait::async_trait;
use sqlx::{Connection as _, Executor, MySqlConnection, PgConnection, SqliteConnection};
use tracing::debug;

/// Driver that opens one sqlx connection per call to `connect`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxDriver;

impl SqlxDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for SqlxDriver {
    async fn connect(&self, dsn: &str) -> DbResult<Box<dyn DriverConnection>> {
        let db_type = DatabaseType::from_connection_string(dsn).ok_or_else(|| {
            DbError::connection(
                "Unrecognized connection string scheme",
                "Use a sqlite:, postgres:// or mysql:// URL",
            )
        })?;

        let backend = match db_type {
            DatabaseType::SQLite => Backend::Sqlite(SqliteConnection::connect(dsn).await?),
            DatabaseType::PostgreSQL => Backend::Postgres(PgConnection::connect(dsn).await?),
            DatabaseType::MySQL => Backend::MySql(MySqlConnection::connect(dsn).await?),
        };
        debug!(db_type = %db_type, "Opened physical connection");

        Ok(Box::new(SqlxConnection {
            db_type,
            backend: Some(backend),
        }))
    }
}

/// A live sqlx connection for one backend.
pub enum Backend {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    Sqlite(SqliteConnection),
}

/// [`DriverConnection`] over a single sqlx connection.
pub struct SqlxConnection {
    db_type: DatabaseType,
    /// `None` once closed
    backend: Option<Backend>,
}

impl SqlxConnection {
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    fn backend(&mut self) -> DbResult<&mut Backend> {
        self.backend.as_mut().ok_or(DbError::ConnectionClosed)
    }
}

#[async_trait]
impl DriverConnection for SqlxConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> DbResult<Option<RawResult>> {
        impl_db_dispatch!(self.backend()?, {
            MySql(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_mysql_param(query, param);
                }
                let rows = query.fetch_all(&mut *c).await?;
                collect_rows(&rows, types::mysql::decode_column)
            },
            Postgres(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_postgres_param(query, param);
                }
                let rows = query.fetch_all(&mut *c).await?;
                collect_rows(&rows, types::postgres::decode_column)
            },
            Sqlite(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_sqlite_param(query, param);
                }
                let rows = query.fetch_all(&mut *c).await?;
                collect_rows(&rows, types::sqlite::decode_column)
            },
        })
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<String> {
        let rows_affected = impl_db_dispatch!(self.backend()?, {
            MySql(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_mysql_param(query, param);
                }
                query.execute(&mut *c).await?.rows_affected()
            },
            Postgres(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_postgres_param(query, param);
                }
                query.execute(&mut *c).await?.rows_affected()
            },
            Sqlite(c) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_sqlite_param(query, param);
                }
                query.execute(&mut *c).await?.rows_affected()
            },
        });
        Ok(execute_status(sql, rows_affected))
    }

    async fn execute_raw(&mut self, sql: &str) -> DbResult<()> {
        // Sent unprepared: MySQL rejects some control statements as prepared
        impl_db_dispatch!(self.backend()?, {
            MySql(c) => {
                Executor::execute(&mut *c, sql).await?;
            },
            Postgres(c) => {
                Executor::execute(&mut *c, sql).await?;
            },
            Sqlite(c) => {
                Executor::execute(&mut *c, sql).await?;
            },
        });
        Ok(())
    }

    async fn close(&mut self) -> DbResult<()> {
        let Some(backend) = self.backend.take() else {
            return Ok(());
        };
        impl_db_dispatch!(backend, {
            MySql(c) => c.close().await?,
            Postgres(c) => c.close().await?,
            Sqlite(c) => c.close().await?,
        });
        debug!(db_type = %self.db_type, "Closed physical connection");
        Ok(())
    }

    fn control_sql(&self, control: TxControl) -> &'static str {
        match (self.db_type, control) {
            (DatabaseType::MySQL, TxControl::Begin) => "START TRANSACTION",
            (DatabaseType::MySQL, TxControl::Commit) => "COMMIT",
            (DatabaseType::MySQL, TxControl::Rollback) => "ROLLBACK",
            (_, control) => control.default_sql(),
        }
    }
}
