//! PostgreSQL store
//!
//! Durable implementation of the ledger, outbox and transaction
//! repositories. Row locks are `SELECT ... FOR UPDATE` inside the unit of
//! work's database transaction, bounded by a transaction-local
//! `lock_timeout`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, Amount, LedgerTransaction, OutboxEntry, OutboxStatus,
};
use crate::ledger::{HeldLocks, LedgerError, LedgerRepository, LockOrder, UnitOfWork};
use crate::orchestrator::{TransactionRepository, TransactionStoreError};
use crate::outbox::{OutboxError, OutboxRepository};

/// `lock_not_available`, raised when `lock_timeout` expires
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

const ACCOUNT_COLUMNS: &str =
    "id, owner_id, balance, currency, overdraft_limit, revision, status, created_at, updated_at";

const OUTBOX_COLUMNS: &str =
    "id, aggregate_id, event_type, topic, payload::text AS payload, status, attempts, created_at, last_attempt_at";

const TRANSACTION_COLUMNS: &str = "id, account_id, target_account_id, amount, transaction_type, \
     reference_number, status, failure_reason, idempotency_key, attempts, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn sqlstate(error: &sqlx::Error) -> Option<String> {
    error
        .as_database_error()
        .and_then(|e| e.code())
        .map(|code| code.into_owned())
}

// =========================================================================
// Row mapping
// =========================================================================

fn account_from_row(row: &PgRow) -> Result<Account, LedgerError> {
    let status: String = row.try_get("status")?;
    let status = status.parse::<AccountStatus>().map_err(LedgerError::CorruptRow)?;

    Ok(Account::from_db_state(
        row.try_get("id")?,
        row.try_get("owner_id")?,
        row.try_get("balance")?,
        row.try_get("currency")?,
        row.try_get("overdraft_limit")?,
        row.try_get("revision")?,
        status,
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    ))
}

fn outbox_from_row(row: &PgRow) -> Result<OutboxEntry, OutboxError> {
    let status: String = row.try_get("status")?;
    Ok(OutboxEntry {
        id: row.try_get("id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        topic: row.try_get("topic")?,
        payload: row.try_get("payload")?,
        status: status.parse().map_err(OutboxError::CorruptRow)?,
        attempts: row.try_get("attempts")?,
        created_at: row.try_get("created_at")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<LedgerTransaction, TransactionStoreError> {
    let amount: Decimal = row.try_get("amount")?;
    let transaction_type: String = row.try_get("transaction_type")?;
    let status: String = row.try_get("status")?;

    Ok(LedgerTransaction {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        target_account_id: row.try_get("target_account_id")?,
        amount: Amount::new(amount)
            .map_err(|e| TransactionStoreError::CorruptRow(e.to_string()))?,
        transaction_type: transaction_type
            .parse()
            .map_err(TransactionStoreError::CorruptRow)?,
        reference_number: row.try_get("reference_number")?,
        status: status.parse().map_err(TransactionStoreError::CorruptRow)?,
        failure_reason: row.try_get("failure_reason")?,
        idempotency_key: row.try_get("idempotency_key")?,
        attempts: row.try_get("attempts")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// =========================================================================
// Ledger
// =========================================================================

#[async_trait]
impl LedgerRepository for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork {
            tx,
            held: HeldLocks::default(),
            lock_timeout: None,
        }))
    }

    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>, LedgerError> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    held: HeldLocks,
    lock_timeout: Option<Duration>,
}

impl PgUnitOfWork {
    async fn set_lock_timeout(&mut self, timeout: Duration) -> Result<(), LedgerError> {
        if self.lock_timeout == Some(timeout) {
            return Ok(());
        }
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", timeout.as_millis()))
            .execute(&mut *self.tx)
            .await?;
        self.lock_timeout = Some(timeout);
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_accounts(
        &mut self,
        order: &LockOrder,
        timeout: Duration,
    ) -> Result<Vec<Account>, LedgerError> {
        self.held.admit(order)?;
        self.set_lock_timeout(timeout).await?;

        let sql = format!("SELECT {} FROM accounts WHERE id = $1 FOR UPDATE", ACCOUNT_COLUMNS);
        let mut accounts = Vec::with_capacity(order.len());

        for &account_id in order.ids() {
            let row = sqlx::query(&sql)
                .bind(account_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| match sqlstate(&e).as_deref() {
                    Some(LOCK_NOT_AVAILABLE) => LedgerError::LockTimeout {
                        account_id,
                        waited_ms: timeout.as_millis() as u64,
                    },
                    _ => LedgerError::Database(e),
                })?;

            let row = row.ok_or_else(|| LedgerError::not_found(account_id))?;
            if !self.held.contains(&account_id) {
                self.held.record(account_id);
            }
            accounts.push(account_from_row(&row)?);
        }

        Ok(accounts)
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, owner_id, balance, currency, overdraft_limit,
                revision, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.id())
        .bind(account.owner_id())
        .bind(account.balance().value())
        .bind(account.currency())
        .bind(account.overdraft_limit())
        .bind(account.revision())
        .bind(account.status().as_str())
        .bind(account.created_at())
        .bind(account.updated_at())
        .execute(&mut *self.tx)
        .await?;

        // A row this transaction created is implicitly locked by it
        self.held.record(account.id());
        Ok(())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        if !self.held.contains(&account.id()) {
            return Err(LedgerError::NotLocked(account.id()));
        }

        let rows_affected = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2,
                status = $3,
                revision = revision + 1,
                updated_at = $4
            WHERE id = $1 AND revision = $5
            "#,
        )
        .bind(account.id())
        .bind(account.balance().value())
        .bind(account.status().as_str())
        .bind(account.updated_at())
        .bind(account.revision())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let found: Option<i64> = sqlx::query_scalar("SELECT revision FROM accounts WHERE id = $1")
                .bind(account.id())
                .fetch_optional(&mut *self.tx)
                .await?;
            return Err(LedgerError::ConcurrentModification {
                account_id: account.id(),
                expected: account.revision(),
                found,
            });
        }
        Ok(())
    }

    async fn insert_outbox(&mut self, entry: &OutboxEntry) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_entries (
                id, aggregate_id, event_type, topic, payload,
                status, attempts, created_at, last_attempt_at
            )
            VALUES ($1, $2, $3, $4, $5::jsonb, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.aggregate_id)
        .bind(&entry.event_type)
        .bind(&entry.topic)
        .bind(&entry.payload)
        .bind(entry.status.as_str())
        .bind(entry.attempts)
        .bind(entry.created_at)
        .bind(entry.last_attempt_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }
}

// =========================================================================
// Outbox
// =========================================================================

#[async_trait]
impl OutboxRepository for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<OutboxEntry>, OutboxError> {
        let sql = format!("SELECT {} FROM outbox_entries WHERE id = $1", OUTBOX_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(outbox_from_row).transpose()
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, OutboxError> {
        let sql = format!(
            "SELECT {} FROM outbox_entries WHERE status = $1 \
             ORDER BY last_attempt_at ASC NULLS FIRST, created_at ASC LIMIT $2",
            OUTBOX_COLUMNS
        );
        sqlx::query(&sql)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(outbox_from_row)
            .collect()
    }

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, OutboxError> {
        let sql = format!(
            r#"
            SELECT {} FROM outbox_entries
            WHERE status = 'PENDING' AND attempts = 0 AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            OUTBOX_COLUMNS
        );
        sqlx::query(&sql)
            .bind(created_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(outbox_from_row)
            .collect()
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        status: OutboxStatus,
        at: DateTime<Utc>,
    ) -> Result<OutboxEntry, OutboxError> {
        let sql = format!(
            r#"
            UPDATE outbox_entries
            SET status = CASE WHEN status = 'SENT' THEN 'SENT' ELSE $2 END,
                attempts = attempts + 1,
                last_attempt_at = $3
            WHERE id = $1
            RETURNING {}
            "#,
            OUTBOX_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(OutboxError::NotFound(id))?;
        outbox_from_row(&row)
    }
}

// =========================================================================
// Transactions
// =========================================================================

#[async_trait]
impl TransactionRepository for PgStore {
    async fn insert(&self, transaction: &LedgerTransaction) -> Result<(), TransactionStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_transactions (
                id, account_id, target_account_id, amount, transaction_type,
                reference_number, status, failure_reason, idempotency_key,
                attempts, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.account_id)
        .bind(transaction.target_account_id)
        .bind(transaction.amount.value())
        .bind(transaction.transaction_type.as_str())
        .bind(&transaction.reference_number)
        .bind(transaction.status.as_str())
        .bind(&transaction.failure_reason)
        .bind(&transaction.idempotency_key)
        .bind(transaction.attempts)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if sqlstate(&e).as_deref() == Some(UNIQUE_VIOLATION) => {
                let constraint = e
                    .as_database_error()
                    .and_then(|d| d.constraint())
                    .unwrap_or_default()
                    .to_string();
                if constraint.contains("idempotency") {
                    Err(TransactionStoreError::DuplicateIdempotencyKey(
                        transaction.idempotency_key.clone().unwrap_or_default(),
                    ))
                } else {
                    Err(TransactionStoreError::DuplicateReference(
                        transaction.reference_number.clone(),
                    ))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, transaction: &LedgerTransaction) -> Result<(), TransactionStoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE ledger_transactions
            SET status = $2, failure_reason = $3, attempts = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.status.as_str())
        .bind(&transaction.failure_reason)
        .bind(transaction.attempts)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(TransactionStoreError::NotFound(transaction.id));
        }
        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference_number: &str,
    ) -> Result<Option<LedgerTransaction>, TransactionStoreError> {
        let sql = format!(
            "SELECT {} FROM ledger_transactions WHERE reference_number = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(reference_number)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<LedgerTransaction>, TransactionStoreError> {
        let sql = format!(
            "SELECT {} FROM ledger_transactions WHERE idempotency_key = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        row.as_ref().map(transaction_from_row).transpose()
    }
}
