//! Bounded connection pool.
//!
//! Admission is a semaphore with `max_size` permits. A borrower holds one
//! permit for as long as it holds a connection, so idle plus in-use
//! connections never exceed `max_size`. The idle and in-use sets are only
//! touched under the pool's state mutex.

use super::connection::Connection;
use super::driver::Driver;
use super::sqlx_driver::SqlxDriver;
use crate::config::PoolOptions;
use crate::error::{DbError, DbResult};
use crate::models::{Record, Value};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Create a pool using the default sqlx driver.
///
/// Pool options may also be given in the DSN query string (`min_size`,
/// `max_size`, `acquire_timeout` in seconds); explicit `options` win.
pub async fn create_pool(dsn: &str, options: PoolOptions) -> DbResult<Pool> {
    create_pool_with(Arc::new(SqlxDriver::new()), dsn, options).await
}

/// Create a pool with an explicit driver.
pub async fn create_pool_with(
    driver: Arc<dyn Driver>,
    dsn: &str,
    options: PoolOptions,
) -> DbResult<Pool> {
    Pool::connect_with(driver, dsn, options).await
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub size: usize,
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Arc<Connection>>,
    in_use: HashMap<u64, Arc<Connection>>,
}

struct PoolInner {
    driver: Arc<dyn Driver>,
    dsn: String,
    options: PoolOptions,
    max_size: usize,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    // Mirrors of the set sizes so the counters can be read without locking
    idle_count: AtomicUsize,
    in_use_count: AtomicUsize,
    closed: AtomicBool,
}

impl PoolInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn sync_counts(&self, state: &PoolState) {
        self.idle_count.store(state.idle.len(), Ordering::Release);
        self.in_use_count.store(state.in_use.len(), Ordering::Release);
    }

    fn size(&self) -> usize {
        self.idle_count.load(Ordering::Acquire) + self.in_use_count.load(Ordering::Acquire)
    }

    /// Move a connection out of the in-use set. Returns it back if it must
    /// be closed instead of reused.
    fn check_in(&self, state: &mut PoolState, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        state.in_use.remove(&conn.id());
        let reusable = !conn.is_closed() && !conn.is_tainted() && !self.is_closed();
        let discard = if reusable {
            state.idle.push(conn);
            None
        } else {
            Some(conn)
        };
        self.sync_counts(state);
        discard
    }
}

/// A borrowed connection on its way back to the pool.
///
/// Holds the admission permit until the connection is idle again or
/// closed. Dropped before that (the releasing future was cancelled, or a
/// guard went out of scope), it finishes the check-in in the background so
/// the permit never outlives the connection's place in the in-use set.
struct CheckIn {
    pool: Arc<PoolInner>,
    conn: Option<Arc<Connection>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl CheckIn {
    async fn finish(mut self) {
        let Some(connection_id) = self.conn.as_ref().map(|c| c.id()) else {
            return;
        };
        let discard = {
            let mut state = self.pool.state.lock().await;
            let Some(conn) = self.conn.take() else {
                return;
            };
            self.pool.check_in(&mut state, conn)
        };
        let permit = self.permit.take();

        if let Some(conn) = discard {
            if conn.is_tainted() {
                debug!(connection_id, "Closing tainted connection");
            }
            if let Err(e) = conn.close().await {
                warn!(connection_id, error = %e, "Failed to close discarded connection");
            }
        }
        drop(permit);
        debug!(connection_id, pool_size = self.pool.size(), "Connection released");
    }
}

impl Drop for CheckIn {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let pool = Arc::clone(&self.pool);
        let permit = self.permit.take();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(connection_id = conn.id(), "Finishing connection release in background");
                handle.spawn(
                    CheckIn {
                        pool,
                        conn: Some(conn),
                        permit,
                    }
                    .finish(),
                );
            }
            // Outside a runtime nothing else can make progress on our
            // behalf, so block for the state lock. A connection that must
            // be closed is dropped without a graceful close.
            Err(_) => {
                let mut state = pool.state.blocking_lock();
                pool.check_in(&mut state, conn);
                drop(state);
                drop(permit);
            }
        }
    }
}

/// A bounded pool of [`Connection`]s. Cheap to clone.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool and open `min_size` connections up front.
    pub async fn connect_with(
        driver: Arc<dyn Driver>,
        dsn: &str,
        options: PoolOptions,
    ) -> DbResult<Self> {
        let (dsn, dsn_options) = PoolOptions::from_dsn(dsn)?;
        let options = options.or(dsn_options);
        options.validate()?;

        let max_size = options.max_size_or_default();
        if max_size > Semaphore::MAX_PERMITS {
            return Err(DbError::invalid_input(format!(
                "max_size cannot exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        let min_size = options.effective_min_size();

        let pool = Self {
            inner: Arc::new(PoolInner {
                driver,
                dsn,
                options,
                max_size,
                semaphore: Arc::new(Semaphore::new(max_size)),
                state: Mutex::new(PoolState::default()),
                idle_count: AtomicUsize::new(0),
                in_use_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        };

        pool.prewarm(min_size).await?;
        info!(min_size, max_size, "Connection pool created");
        Ok(pool)
    }

    async fn prewarm(&self, count: usize) -> DbResult<()> {
        if count == 0 {
            return Ok(());
        }
        let inner = &self.inner;
        let results = join_all(
            (0..count).map(|_| Connection::connect_with(inner.driver.as_ref(), &inner.dsn)),
        )
        .await;

        let mut opened = Vec::with_capacity(count);
        let mut first_err = None;
        for result in results {
            match result {
                Ok(conn) => opened.push(Arc::new(conn)),
                Err(e) if first_err.is_none() => first_err = Some(e),
                Err(_) => {}
            }
        }

        if let Some(err) = first_err {
            warn!(error = %err, opened = opened.len(), "Pool pre-warm failed");
            for conn in opened {
                let _ = conn.close().await;
            }
            return Err(err);
        }

        let mut state = inner.state.lock().await;
        state.idle.extend(opened);
        inner.sync_counts(&state);
        Ok(())
    }

    /// Borrow a connection, waiting for a free slot if the pool is at
    /// capacity.
    ///
    /// Waits forever unless `acquire_timeout` is set. Fails with
    /// `PoolClosed` once the pool is closed, including for callers that
    /// were already waiting.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(DbError::PoolClosed);
        }

        let semaphore = Arc::clone(&inner.semaphore);
        let permit = match inner.options.acquire_timeout {
            Some(limit) => tokio::time::timeout(limit, semaphore.acquire_owned())
                .await
                .map_err(|_| {
                    DbError::timeout(
                        "pool acquire",
                        u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    )
                })?,
            None => semaphore.acquire_owned().await,
        }
        .map_err(|_| DbError::PoolClosed)?;

        let conn = {
            let mut state = inner.state.lock().await;
            if inner.is_closed() {
                return Err(DbError::PoolClosed);
            }
            let conn = match state.idle.pop() {
                Some(conn) => conn,
                None => {
                    let conn = Connection::connect_with(inner.driver.as_ref(), &inner.dsn).await?;
                    Arc::new(conn)
                }
            };
            state.in_use.insert(conn.id(), Arc::clone(&conn));
            inner.sync_counts(&state);
            conn
        };

        debug!(
            connection_id = conn.id(),
            pool_size = inner.size(),
            "Connection acquired"
        );
        Ok(PooledConnection {
            conn,
            permit: Some(permit),
            pool: Arc::clone(inner),
            released: false,
        })
    }

    /// Close the pool and every connection in it, idle or borrowed.
    ///
    /// Borrowers still holding a connection get `ConnectionClosed` on their
    /// next operation; returning it afterwards does not put it back.
    pub async fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.semaphore.close();

        let conns: Vec<Arc<Connection>> = {
            let mut state = inner.state.lock().await;
            let mut conns: Vec<_> = state.idle.drain(..).collect();
            conns.extend(state.in_use.drain().map(|(_, conn)| conn));
            inner.sync_counts(&state);
            conns
        };

        let count = conns.len();
        for conn in conns {
            if let Err(e) = conn.close().await {
                warn!(connection_id = conn.id(), error = %e, "Error closing pooled connection");
            }
        }
        info!(closed_connections = count, "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Idle plus in-use connections.
    pub fn get_size(&self) -> usize {
        self.inner.size()
    }

    pub fn get_idle_size(&self) -> usize {
        self.inner.idle_count.load(Ordering::Acquire)
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    pub fn status(&self) -> PoolStatus {
        let idle = self.inner.idle_count.load(Ordering::Acquire);
        let in_use = self.inner.in_use_count.load(Ordering::Acquire);
        PoolStatus {
            size: idle + in_use,
            idle,
            in_use,
            max_size: self.inner.max_size,
        }
    }

    pub async fn fetch(&self, query: &str, params: &[Value]) -> DbResult<Vec<Record>> {
        let conn = self.acquire().await?;
        let result = conn.fetch(query, params).await;
        conn.release().await;
        result
    }

    pub async fn fetchrow(&self, query: &str, params: &[Value]) -> DbResult<Option<Record>> {
        let conn = self.acquire().await?;
        let result = conn.fetchrow(query, params).await;
        conn.release().await;
        result
    }

    pub async fn fetchval(
        &self,
        query: &str,
        params: &[Value],
        column: usize,
    ) -> DbResult<Option<Value>> {
        let conn = self.acquire().await?;
        let result = conn.fetchval(query, params, column).await;
        conn.release().await;
        result
    }

    pub async fn execute(&self, query: &str, params: &[Value]) -> DbResult<String> {
        let conn = self.acquire().await?;
        let result = conn.execute(query, params).await;
        conn.release().await;
        result
    }

    pub async fn executemany(&self, query: &str, param_sets: &[Vec<Value>]) -> DbResult<()> {
        let conn = self.acquire().await?;
        let result = conn.executemany(query, param_sets).await;
        conn.release().await;
        result
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// A connection borrowed from a [`Pool`].
///
/// Derefs to [`Connection`]. Prefer [`release`](Self::release); dropping
/// the guard also returns the connection, via a spawned task.
pub struct PooledConnection {
    conn: Arc<Connection>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
    released: bool,
}

impl PooledConnection {
    /// Return the connection to its pool.
    ///
    /// Cancelling this future is safe: the return completes in the
    /// background and the slot is freed only after it has.
    pub async fn release(mut self) {
        self.released = true;
        self.begin_check_in().finish().await;
    }

    fn begin_check_in(&mut self) -> CheckIn {
        CheckIn {
            pool: Arc::clone(&self.pool),
            conn: Some(Arc::clone(&self.conn)),
            permit: self.permit.take(),
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection", &self.conn)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            connection_id = self.conn.id(),
            "Connection released via Drop - consider using explicit release()"
        );
        drop(self.begin_check_in());
    }
}
