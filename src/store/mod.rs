//! Transactional Store
//!
//! Runs units of work inside one database transaction and implements the
//! account-to-account transfer on top of it.
//!
//! # Transaction Lifecycle
//!
//! ```text
//! begin ──▶ unit of work ──ok──▶ commit
//!                 │
//!                err / cancelled
//!                 ▼
//!             rollback ──err──▶ Rollback { tx_err, rb_err }
//! ```
//!
//! On cancellation the backend `abort`s instead of plain rollback: a statement
//! may still be in flight on the connection, e.g. waiting on a row lock.
//!
//! All mutual exclusion between concurrent transfers is the database's row
//! locking. Nothing here holds an in-process lock.

pub mod reference;
pub mod transfer;

#[cfg(test)]
pub mod mock;


pub use reference::{RandomReference, ReferenceGenerator};
pub use transfer::{TransferTxParams, TransferTxResult};

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::repository::{PgRepository, PgTxRepository, Queries};

/// Transaction lifecycle of a storage backend
///
/// `Tx` is the transaction-scoped query handle handed to units of work.
#[async_trait]
pub trait TxBackend: Send + Sync {
    type Tx: Queries + Send;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError>;

    /// Roll back a transaction whose unit of work was dropped mid-statement
    async fn abort(&self, tx: Self::Tx) -> Result<(), StoreError> {
        self.rollback(tx).await
    }
}

/// PostgreSQL backend over a connection pool
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Plain, non-transactional query handle
    pub fn repository(&self) -> PgRepository {
        PgRepository::new(self.pool.clone())
    }
}

#[async_trait]
impl TxBackend for PgBackend {
    type Tx = PgTxRepository;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await?;
        let backend_pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut *tx)
            .await?;
        Ok(PgTxRepository::new(tx, backend_pid))
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        tx.into_inner().rollback().await?;
        Ok(())
    }

    /// Interrupt the in-flight statement from a second connection, then roll
    /// back. Without the interrupt the rollback queues behind a lock wait.
    async fn abort(&self, tx: Self::Tx) -> Result<(), StoreError> {
        let backend_pid = tx.backend_pid();
        let signalled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
            .bind(backend_pid)
            .fetch_one(&self.pool)
            .await?;
        debug!(backend_pid, signalled, "Cancel sent to transaction backend");
        self.rollback(tx).await
    }
}

/// Transactional executor plus the transfer operation built on it
pub struct Store<B: TxBackend> {
    backend: B,
    references: Arc<dyn ReferenceGenerator>,
}

impl Store<PgBackend> {
    /// Store over a PostgreSQL pool with the default reference generator
    pub fn postgres(pool: PgPool) -> Self {
        Self::new(PgBackend::new(pool))
    }
}

impl<B: TxBackend> Store<B> {
    pub fn new(backend: B) -> Self {
        Self::with_reference_generator(backend, Arc::new(RandomReference::default()))
    }

    pub fn with_reference_generator(backend: B, references: Arc<dyn ReferenceGenerator>) -> Self {
        Self {
            backend,
            references,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn references(&self) -> Arc<dyn ReferenceGenerator> {
        Arc::clone(&self.references)
    }

    /// Run `work` inside a new transaction
    ///
    /// Commits when `work` succeeds. Otherwise rolls back and returns the
    /// original error, or [`StoreError::Rollback`] carrying both errors when
    /// the rollback fails too. Cancelling `cancel` before commit aborts the
    /// work and rolls back with [`StoreError::Cancelled`].
    pub async fn run_in_transaction<T, F>(
        &self,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut B::Tx) -> BoxFuture<'c, Result<T, StoreError>> + Send,
    {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let mut tx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            tx = self.backend.begin() => tx?,
        };
        debug!("Transaction started");

        let mut cancelled = false;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                Err(StoreError::Cancelled)
            }
            result = work(&mut tx) => result,
        };

        match outcome {
            Ok(value) => {
                self.backend.commit(tx).await?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(tx_err) => {
                let undo = if cancelled {
                    self.backend.abort(tx).await
                } else {
                    self.backend.rollback(tx).await
                };
                match undo {
                    Ok(()) => {
                        warn!(code = tx_err.code(), error = %tx_err, "Transaction rolled back");
                        Err(tx_err)
                    }
                    Err(rb_err) => {
                        error!(
                            error = %tx_err,
                            rollback_error = %rb_err,
                            "Transaction rollback failed"
                        );
                        Err(StoreError::Rollback {
                            tx_err: Box::new(tx_err),
                            rb_err: Box::new(rb_err),
                        })
                    }
                }
            }
        }
    }
}
