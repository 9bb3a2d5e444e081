//! In-memory backend for testing
//!
//! `begin` snapshots the committed state, `commit` replaces it, `rollback`
//! discards the snapshot. Every query is recorded in a shared journal so tests
//! can assert lock order. Faults are injected per backend.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::TxBackend;
use crate::error::StoreError;
use crate::repository::{
    Account, CreateAccountParams, CreateLedgerEntryParams, CreateTransferParams, EntryType,
    LedgerEntry, Queries, Transfer, UpdateAccountParams,
};

/// Journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Begin,
    Lock(i64),
    Update(i64),
    CreateTransfer,
    CreateEntry(EntryType),
    Commit,
    Abort,
    Rollback,
}

/// Configured failures
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub begin: bool,
    pub commit: bool,
    pub rollback: bool,
    /// Fail `update_account` for this account
    pub update_account: Option<i64>,
    /// Fail `create_ledger_entry` for this side
    pub ledger_entry: Option<EntryType>,
    /// Never return from `get_account_for_update` for this account
    pub stall_on_lock: Option<i64>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    transfers: Vec<Transfer>,
    entries: Vec<LedgerEntry>,
    next_row_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_row_id += 1;
        self.next_row_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    committed: Arc<Mutex<Tables>>,
    journal: Arc<Mutex<Vec<Op>>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_account(&self, id: i64, balance: i64, currency: &str) -> Account {
        let account = Account {
            id,
            balance,
            currency: currency.to_string(),
            created_at: Utc::now(),
        };
        self.committed
            .lock()
            .unwrap()
            .accounts
            .insert(id, account.clone());
        account
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock().unwrap() = faults;
    }

    pub fn account(&self, id: i64) -> Option<Account> {
        self.committed.lock().unwrap().accounts.get(&id).cloned()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.committed.lock().unwrap().transfers.clone()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.committed.lock().unwrap().entries.clone()
    }

    pub fn journal(&self) -> Vec<Op> {
        self.journal.lock().unwrap().clone()
    }

    /// Account ids in the order they were locked
    pub fn lock_order(&self) -> Vec<i64> {
        self.journal()
            .into_iter()
            .filter_map(|op| match op {
                Op::Lock(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: Op) {
        self.journal.lock().unwrap().push(op);
    }
}

pub struct MemoryTx {
    working: Tables,
    journal: Arc<Mutex<Vec<Op>>>,
    faults: Faults,
}

impl MemoryTx {
    fn record(&self, op: Op) {
        self.journal.lock().unwrap().push(op);
    }
}

#[async_trait]
impl TxBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let faults = self.faults.lock().unwrap().clone();
        if faults.begin {
            return Err(StoreError::Backend("begin failed".to_string()));
        }
        self.record(Op::Begin);
        Ok(MemoryTx {
            working: self.committed.lock().unwrap().clone(),
            journal: Arc::clone(&self.journal),
            faults,
        })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
        if tx.faults.commit {
            return Err(StoreError::Backend("commit failed".to_string()));
        }
        *self.committed.lock().unwrap() = tx.working;
        self.record(Op::Commit);
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), StoreError> {
        self.record(Op::Rollback);
        if tx.faults.rollback {
            return Err(StoreError::Backend("rollback failed".to_string()));
        }
        Ok(())
    }

    async fn abort(&self, tx: Self::Tx) -> Result<(), StoreError> {
        self.record(Op::Abort);
        self.rollback(tx).await
    }
}

#[async_trait]
impl Queries for MemoryTx {
    async fn get_account(&mut self, id: i64) -> Result<Account, StoreError> {
        self.working
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, StoreError> {
        self.record(Op::Lock(id));
        if self.faults.stall_on_lock == Some(id) {
            std::future::pending::<()>().await;
        }
        self.get_account(id).await
    }

    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, StoreError> {
        if self.faults.update_account == Some(params.id) {
            return Err(StoreError::Backend("update failed".to_string()));
        }
        self.record(Op::Update(params.id));
        let account = self
            .working
            .accounts
            .get_mut(&params.id)
            .ok_or(StoreError::AccountNotFound(params.id))?;
        account.balance = params.balance;
        Ok(account.clone())
    }

    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, StoreError> {
        let id = self.working.accounts.keys().next_back().copied().unwrap_or(0) + 1;
        let account = Account {
            id,
            balance: params.balance,
            currency: params.currency,
            created_at: Utc::now(),
        };
        self.working.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, StoreError> {
        self.record(Op::CreateTransfer);
        let transfer = Transfer {
            id: self.working.next_id(),
            source_account_id: params.source_account_id,
            destination_account_id: params.destination_account_id,
            amount: params.amount,
            currency: params.currency,
            reference: params.reference,
            created_at: Utc::now(),
        };
        self.working.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn create_ledger_entry(
        &mut self,
        params: CreateLedgerEntryParams,
    ) -> Result<LedgerEntry, StoreError> {
        if self.faults.ledger_entry == Some(params.entry_type) {
            return Err(StoreError::Backend("ledger entry insert failed".to_string()));
        }
        self.record(Op::CreateEntry(params.entry_type));
        let entry = LedgerEntry {
            id: self.working.next_id(),
            account_id: params.account_id,
            amount: params.amount,
            entry_type: params.entry_type,
            currency: params.currency,
            status: params.status,
            reference: params.reference,
            created_at: Utc::now(),
        };
        self.working.entries.push(entry.clone());
        Ok(entry)
    }
}
