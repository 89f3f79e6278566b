//! Ledger service
//!
//! Entry point for ledger mutations. Each call commits through the ledger
//! store or the transfer coordinator and only then hands the outbox entries
//! written in that unit of work to the publisher.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Account, Amount, OutboxEntry};
use crate::ledger::{
    Committed, LedgerError, LedgerRepository, LedgerStore, TransferCoordinator, TransferReceipt,
};
use crate::outbox::{EventPublisher, OutboxError};

#[derive(Clone)]
pub struct LedgerService {
    store: LedgerStore,
    coordinator: TransferCoordinator,
    publisher: EventPublisher,
    default_overdraft_limit: Decimal,
}

impl LedgerService {
    pub fn new(
        repository: Arc<dyn LedgerRepository>,
        publisher: EventPublisher,
        lock_timeout: Duration,
    ) -> Self {
        let store = LedgerStore::new(repository, lock_timeout);
        Self {
            coordinator: TransferCoordinator::new(store.clone()),
            store,
            publisher,
            default_overdraft_limit: Decimal::ZERO,
        }
    }

    /// Overdraft granted to accounts opened without an explicit limit
    pub fn with_default_overdraft_limit(mut self, limit: Decimal) -> Self {
        self.default_overdraft_limit = limit;
        self
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub async fn open_account(
        &self,
        owner_id: Uuid,
        currency: &str,
        overdraft_limit: Option<Decimal>,
    ) -> Result<Account, LedgerError> {
        let limit = overdraft_limit.unwrap_or(self.default_overdraft_limit);
        let committed = self.store.open_account(owner_id, currency, limit).await?;
        Ok(self.publish(committed))
    }

    pub async fn close_account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        let committed = self.store.close_account(account_id).await?;
        Ok(self.publish(committed))
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        self.store.get_account(account_id).await
    }

    pub async fn deposit(&self, account_id: Uuid, amount: Amount) -> Result<Account, LedgerError> {
        let committed = self.store.deposit(account_id, amount).await?;
        Ok(self.publish(committed))
    }

    pub async fn withdraw(&self, account_id: Uuid, amount: Amount) -> Result<Account, LedgerError> {
        let committed = self.store.withdraw(account_id, amount).await?;
        Ok(self.publish(committed))
    }

    pub async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Amount,
    ) -> Result<TransferReceipt, LedgerError> {
        let committed = self
            .coordinator
            .transfer(from_account_id, to_account_id, amount)
            .await?;
        Ok(self.publish(committed))
    }

    pub async fn get_outbox_entry(&self, id: Uuid) -> Result<Option<OutboxEntry>, OutboxError> {
        self.publisher.outbox().get(id).await
    }

    /// Start delivery of the committed entries without waiting for it. A
    /// failed or lost delivery is picked up by the retry sweep.
    fn publish<T>(&self, committed: Committed<T>) -> T {
        // Handles are dropped; the spawned tasks record their own outcome
        let _ = self.publisher.dispatch_all(committed.events);
        committed.value
    }
}
