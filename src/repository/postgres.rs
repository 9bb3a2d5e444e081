//! PostgreSQL repositories
//!
//! The SQL lives in free functions generic over [`PgExecutor`] so the
//! pool-bound and transaction-bound repositories issue identical statements.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

use super::Queries;
use super::models::{
    Account, CreateAccountParams, CreateLedgerEntryParams, CreateTransferParams, LedgerEntry,
    Transfer, UpdateAccountParams,
};
use crate::error::StoreError;

async fn get_account<'e, E: PgExecutor<'e>>(
    executor: E,
    id: i64,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"SELECT id, balance, currency, created_at
           FROM accounts WHERE id = $1 LIMIT 1"#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// `FOR NO KEY UPDATE` still excludes other lockers of the row, but does not
/// block the KEY SHARE locks taken by inserts into `transfers`/`transactions`
/// referencing this account.
async fn get_account_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    id: i64,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"SELECT id, balance, currency, created_at
           FROM accounts WHERE id = $1 LIMIT 1
           FOR NO KEY UPDATE"#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

async fn update_account<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &UpdateAccountParams,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"UPDATE accounts SET balance = $2
           WHERE id = $1
           RETURNING id, balance, currency, created_at"#,
    )
    .bind(params.id)
    .bind(params.balance)
    .fetch_optional(executor)
    .await
}

async fn create_account<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &CreateAccountParams,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        r#"INSERT INTO accounts (balance, currency)
           VALUES ($1, $2)
           RETURNING id, balance, currency, created_at"#,
    )
    .bind(params.balance)
    .bind(&params.currency)
    .fetch_one(executor)
    .await
}

async fn create_transfer<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &CreateTransferParams,
) -> Result<Transfer, sqlx::Error> {
    sqlx::query_as::<_, Transfer>(
        r#"INSERT INTO transfers
               (source_account_id, destination_account_id, amount, currency, reference)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING id, source_account_id, destination_account_id, amount,
                     currency, reference, created_at"#,
    )
    .bind(params.source_account_id)
    .bind(params.destination_account_id)
    .bind(params.amount)
    .bind(&params.currency)
    .bind(&params.reference)
    .fetch_one(executor)
    .await
}

async fn create_ledger_entry<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &CreateLedgerEntryParams,
) -> Result<LedgerEntry, sqlx::Error> {
    sqlx::query_as::<_, LedgerEntry>(
        r#"INSERT INTO transactions
               (account_id, amount, transaction_type, currency, status, reference)
           VALUES ($1, $2, $3, $4, $5, $6)
           RETURNING id, account_id, amount, transaction_type, currency,
                     status, reference, created_at"#,
    )
    .bind(params.account_id)
    .bind(params.amount)
    .bind(params.entry_type.as_str())
    .bind(&params.currency)
    .bind(params.status.as_str())
    .bind(&params.reference)
    .fetch_one(executor)
    .await
}

/// Repository running each statement on its own pooled connection
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Queries for PgRepository {
    async fn get_account(&mut self, id: i64) -> Result<Account, StoreError> {
        get_account(&self.pool, id)
            .await?
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, StoreError> {
        get_account_for_update(&self.pool, id)
            .await?
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, StoreError> {
        update_account(&self.pool, &params)
            .await?
            .ok_or(StoreError::AccountNotFound(params.id))
    }

    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, StoreError> {
        Ok(create_account(&self.pool, &params).await?)
    }

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, StoreError> {
        Ok(create_transfer(&self.pool, &params).await?)
    }

    async fn create_ledger_entry(
        &mut self,
        params: CreateLedgerEntryParams,
    ) -> Result<LedgerEntry, StoreError> {
        Ok(create_ledger_entry(&self.pool, &params).await?)
    }
}

/// Repository bound to one open transaction
pub struct PgTxRepository {
    tx: Transaction<'static, Postgres>,
    backend_pid: i32,
}

impl PgTxRepository {
    /// `backend_pid` is the server process serving `tx`'s connection
    pub fn new(tx: Transaction<'static, Postgres>, backend_pid: i32) -> Self {
        Self { tx, backend_pid }
    }

    pub fn backend_pid(&self) -> i32 {
        self.backend_pid
    }

    /// Release the transaction for commit or rollback
    pub fn into_inner(self) -> Transaction<'static, Postgres> {
        self.tx
    }
}

#[async_trait]
impl Queries for PgTxRepository {
    async fn get_account(&mut self, id: i64) -> Result<Account, StoreError> {
        get_account(&mut *self.tx, id)
            .await?
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, StoreError> {
        get_account_for_update(&mut *self.tx, id)
            .await?
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, StoreError> {
        update_account(&mut *self.tx, &params)
            .await?
            .ok_or(StoreError::AccountNotFound(params.id))
    }

    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, StoreError> {
        Ok(create_account(&mut *self.tx, &params).await?)
    }

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, StoreError> {
        Ok(create_transfer(&mut *self.tx, &params).await?)
    }

    async fn create_ledger_entry(
        &mut self,
        params: CreateLedgerEntryParams,
    ) -> Result<LedgerEntry, StoreError> {
        Ok(create_ledger_entry(&mut *self.tx, &params).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::tests::test_postgres_config;
    use crate::repository::{EntryStatus, EntryType};

    async fn repository() -> PgRepository {
        let db = Database::connect(&test_postgres_config())
            .await
            .expect("Failed to connect");
        db.migrate().await.expect("Failed to migrate");
        PgRepository::new(db.pool().clone())
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_create_and_get_account() {
        let mut repo = repository().await;

        let created = repo
            .create_account(CreateAccountParams {
                balance: 1000,
                currency: "USD".to_string(),
            })
            .await
            .expect("Should create account");
        assert!(created.id > 0);

        let fetched = repo.get_account(created.id).await.expect("Should query");
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_missing_account_maps_to_not_found() {
        let mut repo = repository().await;

        let err = repo.get_account_for_update(i64::MAX).await.unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(id) if id == i64::MAX));

        let err = repo
            .update_account(UpdateAccountParams {
                id: i64::MAX,
                balance: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(_)));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_ledger_entry_text_columns_roundtrip() {
        let mut repo = repository().await;
        let account = repo
            .create_account(CreateAccountParams {
                balance: 0,
                currency: "EUR".to_string(),
            })
            .await
            .unwrap();

        let entry = repo
            .create_ledger_entry(CreateLedgerEntryParams {
                account_id: account.id,
                amount: 25,
                entry_type: EntryType::Credit,
                currency: "EUR".to_string(),
                status: EntryStatus::Pending,
                reference: "abcdefghij".to_string(),
            })
            .await
            .expect("Should create ledger entry");

        assert_eq!(entry.entry_type, EntryType::Credit);
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.account_id, account.id);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_transfer_rejects_unknown_account() {
        let mut repo = repository().await;

        let result = repo
            .create_transfer(CreateTransferParams {
                source_account_id: i64::MAX - 1,
                destination_account_id: i64::MAX,
                amount: 10,
                currency: "USD".to_string(),
                reference: "REF1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
