//! Account-to-account transfer
//!
//! One transfer is one database transaction:
//!
//! 1. insert the `transfers` row
//! 2. insert the DEBIT entry for the source (caller's reference)
//! 3. insert the CREDIT entry for the destination (generated reference)
//! 4. lock, read and update both balances, lower account id first
//!
//! Locking the lower id first gives every transfer the same lock acquisition
//! order for a given account pair, so A→B and B→A running concurrently queue
//! on the first row instead of deadlocking.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::reference::ReferenceGenerator;
use super::{Store, TxBackend};
use crate::error::StoreError;
use crate::repository::{
    Account, CreateLedgerEntryParams, CreateTransferParams, EntryStatus, EntryType, LedgerEntry,
    Queries, Transfer, UpdateAccountParams,
};

/// Upper bound on reference length, matching the `VARCHAR(64)` columns
pub const MAX_REFERENCE_LEN: usize = 64;

/// Draws allowed before giving up on a generator that keeps echoing the
/// caller's reference
const MAX_REFERENCE_DRAWS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub source_account_id: i64,
    pub destination_account_id: i64,
    /// Smallest currency unit, must be positive
    pub amount: i64,
    pub currency: String,
    pub reference: String,
}

impl TransferTxParams {
    /// Reject malformed requests before a transaction is opened
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.amount <= 0 {
            return Err(StoreError::InvalidAmount);
        }
        if self.source_account_id == self.destination_account_id {
            return Err(StoreError::SameAccount);
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(StoreError::InvalidCurrency(self.currency.clone()));
        }
        if self.reference.is_empty() {
            return Err(StoreError::InvalidReference("empty".to_string()));
        }
        if self.reference.len() > MAX_REFERENCE_LEN {
            return Err(StoreError::InvalidReference(format!(
                "longer than {} bytes",
                MAX_REFERENCE_LEN
            )));
        }
        Ok(())
    }
}

/// Everything a committed transfer created or updated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub source_account: Account,
    pub destination_account: Account,
    pub source_entry: LedgerEntry,
    pub destination_entry: LedgerEntry,
}

impl<B: TxBackend> Store<B> {
    /// Move `params.amount` from the source to the destination account
    /// atomically.
    ///
    /// Any failure rolls the whole transfer back. Lock contention reported by
    /// the database is returned as-is; see [`StoreError::is_lock_contention`].
    #[instrument(
        skip(self, cancel, params),
        fields(
            source = params.source_account_id,
            destination = params.destination_account_id,
            amount = params.amount
        )
    )]
    pub async fn transfer_tx(
        &self,
        cancel: &CancellationToken,
        params: TransferTxParams,
    ) -> Result<TransferTxResult, StoreError> {
        params.validate()?;

        let references = self.references();
        let result = self
            .run_in_transaction(cancel, move |q| {
                Box::pin(async move { execute_transfer(q, references.as_ref(), params).await })
            })
            .await?;

        info!(
            transfer_id = result.transfer.id,
            source_balance = result.source_account.balance,
            destination_balance = result.destination_account.balance,
            "Transfer committed"
        );
        Ok(result)
    }
}

async fn execute_transfer<Q>(
    q: &mut Q,
    references: &dyn ReferenceGenerator,
    params: TransferTxParams,
) -> Result<TransferTxResult, StoreError>
where
    Q: Queries,
{
    let transfer = q
        .create_transfer(CreateTransferParams {
            source_account_id: params.source_account_id,
            destination_account_id: params.destination_account_id,
            amount: params.amount,
            currency: params.currency.clone(),
            reference: params.reference.clone(),
        })
        .await?;

    let source_entry = q
        .create_ledger_entry(CreateLedgerEntryParams {
            account_id: params.source_account_id,
            amount: params.amount,
            entry_type: EntryType::Debit,
            currency: params.currency.clone(),
            status: EntryStatus::Pending,
            reference: params.reference.clone(),
        })
        .await?;

    let destination_entry = q
        .create_ledger_entry(CreateLedgerEntryParams {
            account_id: params.destination_account_id,
            amount: params.amount,
            entry_type: EntryType::Credit,
            currency: params.currency,
            status: EntryStatus::Pending,
            reference: destination_reference(references, &params.reference)?,
        })
        .await?;

    let (source_account, destination_account) = move_balances(
        q,
        params.source_account_id,
        params.destination_account_id,
        params.amount,
    )
    .await?;

    Ok(TransferTxResult {
        transfer,
        source_account,
        destination_account,
        source_entry,
        destination_entry,
    })
}

/// Destination references are always system-generated and never equal to
/// the caller's reference.
fn destination_reference(
    references: &dyn ReferenceGenerator,
    caller_reference: &str,
) -> Result<String, StoreError> {
    (0..MAX_REFERENCE_DRAWS)
        .map(|_| references.generate())
        .find(|candidate| candidate != caller_reference)
        .ok_or(StoreError::ReferenceExhausted {
            attempts: MAX_REFERENCE_DRAWS,
        })
}

/// One balance change
#[derive(Debug, Clone, Copy)]
struct Leg {
    account_id: i64,
    delta: i64,
}

/// Apply debit and credit in ascending account-id order, returning
/// `(source, destination)` accounts after the update.
async fn move_balances<Q>(
    q: &mut Q,
    source_account_id: i64,
    destination_account_id: i64,
    amount: i64,
) -> Result<(Account, Account), StoreError>
where
    Q: Queries,
{
    let debit = Leg {
        account_id: source_account_id,
        delta: -amount,
    };
    let credit = Leg {
        account_id: destination_account_id,
        delta: amount,
    };

    let source_first = source_account_id < destination_account_id;
    let (first, second) = if source_first {
        (debit, credit)
    } else {
        (credit, debit)
    };

    let first = apply_leg(q, first).await?;
    let second = apply_leg(q, second).await?;

    Ok(if source_first {
        (first, second)
    } else {
        (second, first)
    })
}

async fn apply_leg<Q>(q: &mut Q, leg: Leg) -> Result<Account, StoreError>
where
    Q: Queries,
{
    let account = q.get_account_for_update(leg.account_id).await?;
    debug!(account_id = leg.account_id, balance = account.balance, "Account locked");

    let balance = account
        .balance
        .checked_add(leg.delta)
        .ok_or(StoreError::BalanceOverflow {
            account_id: leg.account_id,
        })?;

    q.update_account(UpdateAccountParams {
        id: leg.account_id,
        balance,
    })
    .await
}
