//! Unit of work
//!
//! Storage seam for the ledger. A unit of work is opened, mutated and then
//! either committed or dropped; dropping without commit rolls back every
//! staged write and releases every row lock it holds.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Account, OutboxEntry};

use super::{LedgerError, LockOrder};

#[async_trait]
pub trait UnitOfWork: Send {
    /// Acquire exclusive row locks in `order` (blocking up to `timeout` per
    /// row) and return the locked rows in the same order.
    ///
    /// Fails with `AccountNotFound` if any row does not exist and with
    /// `LockTimeout` if a lock could not be taken in time.
    async fn lock_accounts(
        &mut self,
        order: &LockOrder,
        timeout: Duration,
    ) -> Result<Vec<Account>, LedgerError>;

    /// Stage a brand new account row
    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError>;

    /// Stage a write of a locked row. The stored revision must still equal
    /// `account.revision()`; the row is written with revision + 1.
    async fn save_account(&mut self, account: &Account) -> Result<(), LedgerError>;

    /// Stage an outbox row alongside the business writes
    async fn insert_outbox(&mut self, entry: &OutboxEntry) -> Result<(), LedgerError>;

    /// Make every staged write visible atomically and release the locks
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

/// Entry point into ledger storage
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError>;

    /// Lock-free read of the last committed state
    async fn find_account(&self, account_id: Uuid) -> Result<Option<Account>, LedgerError>;
}
