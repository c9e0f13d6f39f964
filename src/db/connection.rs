//! A single database session.
//!
//! A [`Connection`] owns exactly one driver handle. Operations on one
//! connection are serialized through an async mutex; operations on
//! different connections run independently.

use super::driver::{Driver, DriverConnection, TxControl};
use super::sqlx_driver::SqlxDriver;
use super::transaction::Transaction;
use crate::error::{DbError, DbResult};
use crate::models::{Record, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};

type Handle = Box<dyn DriverConnection>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Open a connection with the default sqlx driver.
pub async fn connect(dsn: &str) -> DbResult<Connection> {
    Connection::connect_with(&SqlxDriver::new(), dsn).await
}

/// Open a connection with an explicit driver.
pub async fn connect_with(driver: &dyn Driver, dsn: &str) -> DbResult<Connection> {
    Connection::connect_with(driver, dsn).await
}

pub struct Connection {
    id: u64,
    handle: Mutex<Option<Handle>>,
    closed: AtomicBool,
    /// Set when a transaction was abandoned mid-flight; the session may
    /// still hold an open transaction.
    tainted: AtomicBool,
}

impl Connection {
    pub async fn connect_with(driver: &dyn Driver, dsn: &str) -> DbResult<Self> {
        let handle = driver.connect(dsn).await?;
        Ok(Self::from_handle(handle))
    }

    /// Wrap an already-open driver handle.
    pub fn from_handle(handle: Handle) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(connection_id = id, "Connection opened");
        Self {
            id,
            handle: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
            tainted: AtomicBool::new(false),
        }
    }

    /// Process-unique identifier, used in logs and by the pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted.load(Ordering::Acquire)
    }

    pub(crate) fn taint(&self) {
        self.tainted.store(true, Ordering::Release);
    }

    /// Lock the driver handle, failing if the connection is closed.
    async fn handle(&self) -> DbResult<MappedMutexGuard<'_, Handle>> {
        if self.is_closed() {
            return Err(DbError::ConnectionClosed);
        }
        let guard = self.handle.lock().await;
        MutexGuard::try_map(guard, Option::as_mut).map_err(|_| DbError::ConnectionClosed)
    }

    /// Run a query and return every row.
    pub async fn fetch(&self, query: &str, params: &[Value]) -> DbResult<Vec<Record>> {
        let raw = self.handle().await?.query(query, params).await?;
        let records = match raw {
            Some(raw) => raw.into_records()?,
            None => Vec::new(),
        };
        debug!(connection_id = self.id, rows = records.len(), "fetch");
        Ok(records)
    }

    /// First row of [`fetch`](Self::fetch), if any.
    pub async fn fetchrow(&self, query: &str, params: &[Value]) -> DbResult<Option<Record>> {
        Ok(self.fetch(query, params).await?.into_iter().next())
    }

    /// Column `column` of the first row, if any.
    ///
    /// A row that exists but has no such column is an error.
    pub async fn fetchval(
        &self,
        query: &str,
        params: &[Value],
        column: usize,
    ) -> DbResult<Option<Value>> {
        match self.fetchrow(query, params).await? {
            Some(row) => row.try_get(column).cloned().map(Some),
            None => Ok(None),
        }
    }

    /// Run a statement and return the driver's status string.
    pub async fn execute(&self, query: &str, params: &[Value]) -> DbResult<String> {
        let status = self.handle().await?.execute(query, params).await?;
        debug!(connection_id = self.id, status = %status, "execute");
        Ok(status)
    }

    /// Run a statement once per parameter set, in order. The first failure
    /// aborts the remaining sets.
    pub async fn executemany(&self, query: &str, param_sets: &[Vec<Value>]) -> DbResult<()> {
        self.handle()
            .await?
            .execute_many(query, param_sets)
            .await?;
        debug!(
            connection_id = self.id,
            sets = param_sets.len(),
            "executemany"
        );
        Ok(())
    }

    /// Issue a transaction control statement.
    pub(crate) async fn control(&self, control: TxControl) -> DbResult<()> {
        let mut handle = self.handle().await?;
        let sql = handle.control_sql(control);
        handle.execute_raw(sql).await?;
        debug!(connection_id = self.id, sql, "transaction control");
        Ok(())
    }

    /// A new, not yet started transaction on this connection.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Close the connection. Only the first call releases the handle.
    pub async fn close(&self) -> DbResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let handle = self.handle.lock().await.take();
        if let Some(mut handle) = handle {
            if let Err(e) = handle.close().await {
                warn!(connection_id = self.id, error = %e, "Error while closing connection");
                return Err(e);
            }
        }
        debug!(connection_id = self.id, "Connection closed");
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("tainted", &self.is_tainted())
            .finish()
    }
}
