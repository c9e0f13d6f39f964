//! Transactions.
//!
//! A [`Transaction`] borrows its [`Connection`] for its whole lifetime and
//! moves through `NotStarted -> Active -> Committed | RolledBack`.

use super::connection::Connection;
use super::driver::TxControl;
use crate::error::{DbError, DbResult};
use crate::models::TransactionState;
use std::ops::Deref;
use tracing::{debug, warn};

pub struct Transaction<'c> {
    conn: &'c Connection,
    state: TransactionState,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            state: TransactionState::NotStarted,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    /// Issue `BEGIN`. Valid only once.
    pub async fn start(&mut self) -> DbResult<()> {
        if self.state != TransactionState::NotStarted {
            return Err(DbError::transaction("Transaction already started"));
        }
        self.conn.control(TxControl::Begin).await?;
        self.state = TransactionState::Active;
        debug!(connection_id = self.conn.id(), "Transaction started");
        Ok(())
    }

    /// Issue `COMMIT`. The transaction is marked finished before the
    /// statement runs, so a failed commit cannot be retried.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.finish(TransactionState::Committed)?;
        self.conn.control(TxControl::Commit).await?;
        debug!(connection_id = self.conn.id(), "Transaction committed");
        Ok(())
    }

    /// Issue `ROLLBACK`. Same guards as [`commit`](Self::commit).
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.finish(TransactionState::RolledBack)?;
        self.conn.control(TxControl::Rollback).await?;
        debug!(connection_id = self.conn.id(), "Transaction rolled back");
        Ok(())
    }

    fn finish(&mut self, next: TransactionState) -> DbResult<()> {
        if !self.state.is_active() {
            return Err(DbError::transaction("Transaction not active"));
        }
        self.state = next;
        Ok(())
    }

    /// Run `block` inside the transaction.
    ///
    /// Starts the transaction, then commits if `block` returns `Ok` and
    /// rolls back if it returns `Err`. If `block` already committed or
    /// rolled back, nothing more is issued. A failing commit or rollback
    /// is returned to the caller.
    pub async fn run<T, E, F>(mut self, block: F) -> Result<T, E>
    where
        F: AsyncFnOnce(&mut Transaction<'c>) -> Result<T, E>,
        E: From<DbError>,
    {
        self.start().await?;
        let outcome = block(&mut self).await;

        if !self.is_active() {
            return outcome;
        }
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(
                        connection_id = self.conn.id(),
                        error = %rollback_err,
                        "Rollback after failed transaction block failed"
                    );
                    return Err(rollback_err.into());
                }
                Err(err)
            }
        }
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state.is_active() {
            warn!(
                connection_id = self.conn.id(),
                "Transaction dropped while active; connection marked unusable for reuse"
            );
            self.conn.taint();
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("connection_id", &self.conn.id())
            .field("state", &self.state)
            .finish()
    }
}
