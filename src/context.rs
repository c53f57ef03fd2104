//! Data context handle: one database connection plus its staged changeset.
//!
//! A [`DataContext`] is the unit of ownership behind a unit of work. It holds
//! a single SeaORM connection handle and accumulates staged insert, update,
//! and delete operations in memory. Nothing touches the store until
//! [`DataContext::commit`] flushes the whole changeset inside one transaction.
//!
//! # Invariants
//! - Staged operations are applied in staging order within a single
//!   transaction; on any failure the transaction rolls back and nothing from
//!   the drained changeset is persisted.
//! - [`DataContext::close`] releases the connection handle exactly once;
//!   repeated calls are no-ops and later operations fail with
//!   [`Error::ContextClosed`].

use std::sync::Mutex;

use futures::future::BoxFuture;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};

use crate::error::Error;

/// A staged insert, update, or delete, deferred until commit.
///
/// Each operation runs against the commit transaction and reports the number
/// of entities it affected.
pub(crate) type StagedOp =
    Box<dyn for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<u64, DbErr>> + Send>;

/// Connection handle bound to one database, tracking staged changes until
/// they are committed.
///
/// One instance exists per unit of work and context role (writer or reader).
/// Repositories hold a shared reference and forward their mutations here.
pub struct DataContext {
    /// `None` once the context has been closed.
    db: Mutex<Option<DatabaseConnection>>,
    staged: Mutex<Vec<StagedOp>>,
}

impl DataContext {
    /// Wraps a live connection handle in a fresh context with an empty
    /// changeset.
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db: Mutex::new(Some(db)),
            staged: Mutex::new(Vec::new()),
        }
    }

    /// Returns a handle to the underlying connection for query execution.
    ///
    /// SeaORM connections are cheap pool handles, so this clones rather than
    /// borrows to keep the lock scope minimal.
    pub fn connection(&self) -> Result<DatabaseConnection, Error> {
        self.db
            .lock()
            .expect("data context connection lock poisoned")
            .clone()
            .ok_or(Error::ContextClosed)
    }

    /// Stages a mutation for the next commit.
    pub(crate) fn stage<F>(&self, op: F) -> Result<(), Error>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<u64, DbErr>>
            + Send
            + 'static,
    {
        if self
            .db
            .lock()
            .expect("data context connection lock poisoned")
            .is_none()
        {
            return Err(Error::ContextClosed);
        }

        self.staged
            .lock()
            .expect("data context changeset lock poisoned")
            .push(Box::new(op));

        Ok(())
    }

    /// Number of staged operations awaiting commit.
    pub fn pending(&self) -> usize {
        self.staged
            .lock()
            .expect("data context changeset lock poisoned")
            .len()
    }

    /// Flushes the entire staged changeset in one transaction.
    ///
    /// Returns the total number of entities affected. All-or-nothing: on any
    /// failure the transaction rolls back, the error propagates unchanged,
    /// and the drained changeset is discarded. Dropping the returned future
    /// mid-flight likewise rolls the transaction back, so no partial commit
    /// is ever observable.
    pub async fn commit(&self) -> Result<u64, Error> {
        let db = self.connection()?;

        let ops: Vec<StagedOp> = self
            .staged
            .lock()
            .expect("data context changeset lock poisoned")
            .drain(..)
            .collect();

        if ops.is_empty() {
            return Ok(0);
        }

        let staged_count = ops.len();
        let txn = db.begin().await?;

        let mut affected = 0;
        for op in ops {
            affected += op(&txn).await?;
        }

        txn.commit().await?;

        tracing::debug!(staged_count, affected, "flushed staged changeset");

        Ok(affected)
    }

    /// Releases the connection handle and discards any staged operations.
    ///
    /// Idempotent: the handle is released exactly once, repeated calls are
    /// safe no-ops. Operations issued after closing fail with
    /// [`Error::ContextClosed`].
    pub fn close(&self) {
        let handle = self
            .db
            .lock()
            .expect("data context connection lock poisoned")
            .take();

        if handle.is_some() {
            let discarded = {
                let mut staged = self
                    .staged
                    .lock()
                    .expect("data context changeset lock poisoned");
                let discarded = staged.len();
                staged.clear();
                discarded
            };

            if discarded > 0 {
                tracing::warn!(discarded, "closed data context with uncommitted changes");
            }
        }
    }

    /// Whether the context handle has been released.
    pub fn is_closed(&self) -> bool {
        self.db
            .lock()
            .expect("data context connection lock poisoned")
            .is_none()
    }
}
