//! Query layer for accounts, transfers and ledger entries
//!
//! [`Queries`] is the capability set the transfer flow needs. It is
//! implemented by a pool-bound repository ([`PgRepository`]) and by a
//! transaction-bound one ([`PgTxRepository`]); both run the same SQL.

pub mod models;
pub mod postgres;

pub use models::{
    Account, CreateAccountParams, CreateLedgerEntryParams, CreateTransferParams, EntryStatus,
    EntryType, LedgerEntry, Transfer, UpdateAccountParams,
};
pub use postgres::{PgRepository, PgTxRepository};

use async_trait::async_trait;

use crate::error::StoreError;

/// Reads and writes used by the transfer flow
///
/// Methods take `&mut self` so a transaction-bound implementation can drive
/// its single connection.
#[async_trait]
pub trait Queries: Send {
    /// Read an account without locking it
    async fn get_account(&mut self, id: i64) -> Result<Account, StoreError>;

    /// Read an account and hold an exclusive row lock until the enclosing
    /// transaction ends
    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, StoreError>;

    /// Overwrite an account balance, returning the updated row
    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, StoreError>;

    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, StoreError>;

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, StoreError>;

    async fn create_ledger_entry(
        &mut self,
        params: CreateLedgerEntryParams,
    ) -> Result<LedgerEntry, StoreError>;
}
