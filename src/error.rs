//! Store Error Types
//!
//! One error enum shared by the query layer, the transactional executor and
//! the transfer orchestrator.

use thiserror::Error;

/// Postgres SQLSTATE codes raised by lock contention.
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";
const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";

#[derive(Error, Debug)]
pub enum StoreError {
    // === Request Validation ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Source and destination account cannot be the same")]
    SameAccount,

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    // === Domain Writes ===
    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error("Balance overflow on account {account_id}")]
    BalanceOverflow { account_id: i64 },

    /// The reference generator kept producing the caller's reference.
    #[error("Reference generator exhausted after {attempts} draws")]
    ReferenceExhausted { attempts: usize },

    // === Transaction Lifecycle ===
    #[error("Transaction cancelled")]
    Cancelled,

    /// The unit of work failed and the rollback issued for it failed too.
    #[error("tx err: {tx_err}, rb err: {rb_err}")]
    Rollback {
        tx_err: Box<StoreError>,
        rb_err: Box<StoreError>,
    },

    // === Backends ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Stable error code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidAmount => "INVALID_AMOUNT",
            StoreError::SameAccount => "SAME_ACCOUNT",
            StoreError::InvalidCurrency(_) => "INVALID_CURRENCY",
            StoreError::InvalidReference(_) => "INVALID_REFERENCE",
            StoreError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            StoreError::BalanceOverflow { .. } => "BALANCE_OVERFLOW",
            StoreError::ReferenceExhausted { .. } => "REFERENCE_EXHAUSTED",
            StoreError::Cancelled => "CANCELLED",
            StoreError::Rollback { .. } => "ROLLBACK_FAILED",
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Backend(_) => "BACKEND_ERROR",
        }
    }

    /// True for request-validation failures raised before any transaction opens
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidAmount
                | StoreError::SameAccount
                | StoreError::InvalidCurrency(_)
                | StoreError::InvalidReference(_)
        )
    }

    /// True when the engine aborted on lock contention (deadlock, lock timeout,
    /// serialization failure).
    ///
    /// Nothing in this crate retries; callers may resubmit the whole transfer.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) => matches!(
                db_err.code().as_deref(),
                Some(SQLSTATE_DEADLOCK_DETECTED)
                    | Some(SQLSTATE_LOCK_NOT_AVAILABLE)
                    | Some(SQLSTATE_SERIALIZATION_FAILURE)
            ),
            StoreError::Rollback { tx_err, .. } => tx_err.is_lock_contention(),
            _ => false,
        }
    }
}
