//! In-memory store
//!
//! Process-local implementation of the ledger, outbox and transaction
//! repositories. Row locks come from a per-account `LockManager`; staged
//! writes become visible all at once on commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::{Account, LedgerTransaction, OutboxEntry, OutboxStatus};
use crate::ledger::{
    HeldLocks, LedgerError, LedgerRepository, LockManager, LockOrder, RowGuard, UnitOfWork,
};
use crate::orchestrator::{TransactionRepository, TransactionStoreError};
use crate::outbox::{OutboxError, OutboxRepository};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    outbox: HashMap<Uuid, OutboxEntry>,
    transactions: HashMap<Uuid, LedgerTransaction>,
    by_reference: HashMap<String, Uuid>,
    by_idempotency_key: HashMap<String, Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<LockManager>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an account row directly, bypassing row locks, as an external
    /// writer (data repair, replication) would. Bumps the revision.
    pub fn overwrite_account(&self, mut account: Account) {
        let mut tables = self.tables.lock();
        if let Some(current) = tables.accounts.get(&account.id()) {
            while account.revision() <= current.revision() {
                account.mark_persisted();
            }
        }
        tables.accounts.insert(account.id(), account);
    }

    /// Snapshot of every outbox row, oldest first
    pub fn outbox_entries(&self) -> Vec<OutboxEntry> {
        let tables = self.tables.lock();
        let mut entries: Vec<OutboxEntry> = tables.outbox.values().cloned().collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }
}

// =========================================================================
// Ledger
// =========================================================================

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        Ok(Box::new(MemoryUnitOfWork {
            tables: Arc::clone(&self.tables),
            locks: Arc::clone(&self.locks),
            held: HeldLocks::default(),
            guards: Vec::new(),
            inserted: Vec::new(),
            writes: Vec::new(),
            outbox: Vec::new(),
        }))
    }

    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>, LedgerError> {
        Ok(self.tables.lock().accounts.get(&account_id).cloned())
    }
}

struct StagedWrite {
    expected_revision: i64,
    account: Account,
}

struct MemoryUnitOfWork {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<LockManager>,
    held: HeldLocks,
    // Released when the unit of work is dropped, committed or not
    guards: Vec<RowGuard>,
    inserted: Vec<Account>,
    writes: Vec<StagedWrite>,
    outbox: Vec<OutboxEntry>,
}

impl MemoryUnitOfWork {
    fn staged(&self, account_id: &Uuid) -> Option<Account> {
        self.writes
            .iter()
            .find(|w| w.account.id() == *account_id)
            .map(|w| {
                let mut account = w.account.clone();
                account.mark_persisted();
                account
            })
            .or_else(|| self.inserted.iter().find(|a| a.id() == *account_id).cloned())
    }

    fn read_rows(&self, order: &LockOrder) -> Result<Vec<Account>, LedgerError> {
        let tables = self.tables.lock();
        order
            .ids()
            .iter()
            .map(|id| {
                self.staged(id)
                    .or_else(|| tables.accounts.get(id).cloned())
                    .ok_or_else(|| LedgerError::not_found(*id))
            })
            .collect()
    }

    fn apply(self) -> Result<(), LedgerError> {
        let mut tables = self.tables.lock();

        for account in &self.inserted {
            if tables.accounts.contains_key(&account.id()) {
                return Err(LedgerError::CorruptRow(format!(
                    "account {} already exists",
                    account.id()
                )));
            }
        }
        for write in &self.writes {
            let stored = tables.accounts.get(&write.account.id()).map(|a| a.revision());
            if stored != Some(write.expected_revision) {
                return Err(LedgerError::ConcurrentModification {
                    account_id: write.account.id(),
                    expected: write.expected_revision,
                    found: stored,
                });
            }
        }

        for account in self.inserted {
            tables.accounts.insert(account.id(), account);
        }
        for write in self.writes {
            let mut account = write.account;
            account.mark_persisted();
            tables.accounts.insert(account.id(), account);
        }
        for entry in self.outbox {
            tables.outbox.insert(entry.id, entry);
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_accounts(
        &mut self,
        order: &LockOrder,
        timeout: Duration,
    ) -> Result<Vec<Account>, LedgerError> {
        let fresh = LockOrder::new(self.held.admit(order)?);
        for (id, guard) in self.locks.acquire_all(&fresh, timeout).await? {
            self.held.record(id);
            self.guards.push(guard);
        }
        self.read_rows(order)
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        self.inserted.push(account.clone());
        Ok(())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        if !self.held.contains(&account.id()) {
            return Err(LedgerError::NotLocked(account.id()));
        }
        match self.writes.iter_mut().find(|w| w.account.id() == account.id()) {
            Some(write) => write.account = account.clone(),
            None => self.writes.push(StagedWrite {
                expected_revision: account.revision(),
                account: account.clone(),
            }),
        }
        Ok(())
    }

    async fn insert_outbox(&mut self, entry: &OutboxEntry) -> Result<(), LedgerError> {
        self.outbox.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        (*self).apply()
    }
}

// =========================================================================
// Outbox
// =========================================================================

fn oldest_first(mut entries: Vec<OutboxEntry>, limit: i64) -> Vec<OutboxEntry> {
    entries.sort_by_key(|e| e.created_at);
    entries.truncate(limit.max(0) as usize);
    entries
}

/// Never-attempted first, then least recently attempted
fn least_recently_attempted(mut entries: Vec<OutboxEntry>, limit: i64) -> Vec<OutboxEntry> {
    entries.sort_by_key(|e| (e.last_attempt_at, e.created_at));
    entries.truncate(limit.max(0) as usize);
    entries
}

#[async_trait]
impl OutboxRepository for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<OutboxEntry>, OutboxError> {
        Ok(self.tables.lock().outbox.get(&id).cloned())
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, OutboxError> {
        let entries = self
            .tables
            .lock()
            .outbox
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect();
        Ok(least_recently_attempted(entries, limit))
    }

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, OutboxError> {
        let entries = self
            .tables
            .lock()
            .outbox
            .values()
            .filter(|e| {
                e.status == OutboxStatus::Pending && e.attempts == 0 && e.created_at < created_before
            })
            .cloned()
            .collect();
        Ok(oldest_first(entries, limit))
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        status: OutboxStatus,
        at: DateTime<Utc>,
    ) -> Result<OutboxEntry, OutboxError> {
        let mut tables = self.tables.lock();
        let entry = tables.outbox.get_mut(&id).ok_or(OutboxError::NotFound(id))?;
        let status = if entry.status == OutboxStatus::Sent {
            OutboxStatus::Sent
        } else {
            status
        };
        entry.record_attempt(status, at);
        Ok(entry.clone())
    }
}

// =========================================================================
// Transactions
// =========================================================================

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn insert(&self, transaction: &LedgerTransaction) -> Result<(), TransactionStoreError> {
        let mut tables = self.tables.lock();
        if tables.by_reference.contains_key(&transaction.reference_number) {
            return Err(TransactionStoreError::DuplicateReference(
                transaction.reference_number.clone(),
            ));
        }
        if let Some(key) = &transaction.idempotency_key {
            if tables.by_idempotency_key.contains_key(key) {
                return Err(TransactionStoreError::DuplicateIdempotencyKey(key.clone()));
            }
            tables.by_idempotency_key.insert(key.clone(), transaction.id);
        }
        tables
            .by_reference
            .insert(transaction.reference_number.clone(), transaction.id);
        tables.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn update(&self, transaction: &LedgerTransaction) -> Result<(), TransactionStoreError> {
        let mut tables = self.tables.lock();
        let stored = tables
            .transactions
            .get_mut(&transaction.id)
            .ok_or(TransactionStoreError::NotFound(transaction.id))?;
        stored.status = transaction.status;
        stored.failure_reason = transaction.failure_reason.clone();
        stored.attempts = transaction.attempts;
        stored.updated_at = transaction.updated_at;
        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference_number: &str,
    ) -> Result<Option<LedgerTransaction>, TransactionStoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .by_reference
            .get(reference_number)
            .and_then(|id| tables.transactions.get(id))
            .cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<LedgerTransaction>, TransactionStoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .by_idempotency_key
            .get(key)
            .and_then(|id| tables.transactions.get(id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, LedgerEvent, TransactionRequest};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const TIMEOUT: Duration = Duration::from_millis(200);

    async fn seeded(store: &MemoryStore) -> Account {
        let account = Account::open(Uuid::new_v4(), "USD", Decimal::ZERO);
        let mut uow = store.begin().await.unwrap();
        uow.insert_account(&account).await.unwrap();
        uow.commit().await.unwrap();
        account
    }

    #[tokio::test]
    async fn test_dropped_unit_of_work_rolls_back() {
        let store = MemoryStore::new();
        let account = seeded(&store).await;

        {
            let mut uow = store.begin().await.unwrap();
            let mut rows = uow
                .lock_accounts(&LockOrder::single(account.id()), TIMEOUT)
                .await
                .unwrap();
            rows[0].credit(&Amount::new(dec!(50)).unwrap()).unwrap();
            uow.save_account(&rows[0]).await.unwrap();
            let event = LedgerEvent::AccountClosed {
                account_id: account.id(),
                closed_at: Utc::now(),
            };
            uow.insert_outbox(&OutboxEntry::from_event(&event).unwrap())
                .await
                .unwrap();
        }

        let stored = store.find_account(account.id()).await.unwrap().unwrap();
        assert_eq!(stored.balance().value(), Decimal::ZERO);
        assert_eq!(stored.revision(), 0);
        assert!(store.outbox_entries().is_empty());

        // Lock was released by the drop
        let mut uow = store.begin().await.unwrap();
        assert!(uow
            .lock_accounts(&LockOrder::single(account.id()), TIMEOUT)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_commit_bumps_revision() {
        let store = MemoryStore::new();
        let account = seeded(&store).await;

        let mut uow = store.begin().await.unwrap();
        let rows = uow
            .lock_accounts(&LockOrder::single(account.id()), TIMEOUT)
            .await
            .unwrap();
        uow.save_account(&rows[0]).await.unwrap();
        uow.commit().await.unwrap();

        let stored = store.find_account(account.id()).await.unwrap().unwrap();
        assert_eq!(stored.revision(), 1);
    }

    #[tokio::test]
    async fn test_external_writer_detected() {
        let store = MemoryStore::new();
        let account = seeded(&store).await;

        let mut uow = store.begin().await.unwrap();
        let rows = uow
            .lock_accounts(&LockOrder::single(account.id()), TIMEOUT)
            .await
            .unwrap();
        uow.save_account(&rows[0]).await.unwrap();

        store.overwrite_account(account.clone());

        let result = uow.commit().await;
        assert!(matches!(
            result,
            Err(LedgerError::ConcurrentModification { expected: 0, found: Some(1), .. })
        ));
    }

    #[tokio::test]
    async fn test_save_without_lock_rejected() {
        let store = MemoryStore::new();
        let account = seeded(&store).await;

        let mut uow = store.begin().await.unwrap();
        let result = uow.save_account(&account).await;
        assert!(matches!(result, Err(LedgerError::NotLocked(id)) if id == account.id()));
    }

    #[tokio::test]
    async fn test_lock_missing_account() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let missing = Uuid::new_v4();

        let result = uow.lock_accounts(&LockOrder::single(missing), TIMEOUT).await;
        assert!(matches!(result, Err(e) if e.kind() == crate::ledger::LedgerErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_record_attempt_never_downgrades_sent() {
        let store = MemoryStore::new();
        let account = seeded(&store).await;
        let event = LedgerEvent::AccountClosed {
            account_id: account.id(),
            closed_at: Utc::now(),
        };
        let entry = OutboxEntry::from_event(&event).unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.insert_outbox(&entry).await.unwrap();
        uow.commit().await.unwrap();

        store.record_attempt(entry.id, OutboxStatus::Sent, Utc::now()).await.unwrap();
        let after = store
            .record_attempt(entry.id, OutboxStatus::Failed, Utc::now())
            .await
            .unwrap();

        assert_eq!(after.status, OutboxStatus::Sent);
        assert_eq!(after.attempts, 2);
    }

    #[tokio::test]
    async fn test_transaction_reference_unique() {
        let store = MemoryStore::new();
        let request = TransactionRequest::deposit(Uuid::new_v4(), Amount::new(dec!(10)).unwrap());
        let first = LedgerTransaction::pending(&request);
        store.insert(&first).await.unwrap();

        let mut clash = LedgerTransaction::pending(&request);
        clash.reference_number = first.reference_number.clone();

        let result = store.insert(&clash).await;
        assert!(matches!(result, Err(TransactionStoreError::DuplicateReference(_))));
        assert!(store
            .find_by_reference(&first.reference_number)
            .await
            .unwrap()
            .is_some());
    }
}
