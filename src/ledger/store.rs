//! Ledger Store
//!
//! Owns account balance state. Every mutation runs inside one unit of work
//! that holds the affected row locks and also carries the outbox entry
//! describing the change.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Account, Amount, DomainError, LedgerEvent, OutboxEntry};

use super::{LedgerError, LedgerRepository, LockOrder, UnitOfWork};

/// Result of a committed mutation together with the outbox entries written
/// in the same unit of work
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub events: Vec<OutboxEntry>,
}

impl<T> Committed<T> {
    pub fn new(value: T, events: Vec<OutboxEntry>) -> Self {
        Self { value, events }
    }
}

#[derive(Clone)]
pub struct LedgerStore {
    repository: Arc<dyn LedgerRepository>,
    lock_timeout: Duration,
}

impl LedgerStore {
    pub fn new(repository: Arc<dyn LedgerRepository>, lock_timeout: Duration) -> Self {
        Self {
            repository,
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Open a unit of work on the underlying repository
    pub async fn begin(&self) -> Result<Box<dyn UnitOfWork>, LedgerError> {
        self.repository.begin().await
    }

    /// Lock rows in canonical order. All ledger code goes through here.
    pub async fn lock(
        &self,
        uow: &mut dyn UnitOfWork,
        order: &LockOrder,
    ) -> Result<Vec<Account>, LedgerError> {
        let accounts = uow.lock_accounts(order, self.lock_timeout).await?;
        tracing::debug!(accounts = ?order.ids(), "Row locks acquired");
        Ok(accounts)
    }

    /// Read the last committed state of an account without locking
    pub async fn get_account(&self, account_id: Uuid) -> Result<Account, LedgerError> {
        self.repository
            .find_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(account_id))
    }

    // =========================================================================
    // Account lifecycle
    // =========================================================================

    /// Open an account for a verified customer
    pub async fn open_account(
        &self,
        owner_id: Uuid,
        currency: &str,
        overdraft_limit: Decimal,
    ) -> Result<Committed<Account>, LedgerError> {
        if overdraft_limit < Decimal::ZERO {
            return Err(DomainError::Validation("overdraft limit cannot be negative".to_string()).into());
        }
        let currency = normalize_currency(currency)?;

        let account = Account::open(owner_id, currency, overdraft_limit);
        let event = LedgerEvent::AccountOpened {
            account_id: account.id(),
            owner_id,
            currency: account.currency().to_string(),
            opened_at: account.created_at(),
        };

        let mut uow = self.begin().await?;
        uow.insert_account(&account).await?;
        let entry = record_event(uow.as_mut(), &event).await?;
        uow.commit().await?;

        tracing::info!(account_id = %account.id(), owner_id = %owner_id, "Account opened");
        Ok(Committed::new(account, vec![entry]))
    }

    /// Close an empty account
    pub async fn close_account(&self, account_id: Uuid) -> Result<Committed<Account>, LedgerError> {
        let mut uow = self.begin().await?;
        let mut account = self.lock_one(uow.as_mut(), account_id).await?;

        account.close()?;
        persist(uow.as_mut(), &mut account).await?;

        let event = LedgerEvent::AccountClosed {
            account_id,
            closed_at: account.updated_at(),
        };
        let entry = record_event(uow.as_mut(), &event).await?;
        uow.commit().await?;

        tracing::info!(account_id = %account_id, "Account closed");
        Ok(Committed::new(account, vec![entry]))
    }

    // =========================================================================
    // Balance operations
    // =========================================================================

    pub async fn deposit(&self, account_id: Uuid, amount: Amount) -> Result<Committed<Account>, LedgerError> {
        let mut uow = self.begin().await?;
        let mut account = self.lock_one(uow.as_mut(), account_id).await?;

        account.credit(&amount)?;
        persist(uow.as_mut(), &mut account).await?;

        let event = LedgerEvent::FundsDeposited {
            account_id,
            amount: amount.value(),
            balance_after: account.balance().value(),
            occurred_at: Utc::now(),
        };
        let entry = record_event(uow.as_mut(), &event).await?;
        uow.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = %amount,
            balance = %account.balance(),
            "Deposit committed"
        );
        Ok(Committed::new(account, vec![entry]))
    }

    pub async fn withdraw(&self, account_id: Uuid, amount: Amount) -> Result<Committed<Account>, LedgerError> {
        let mut uow = self.begin().await?;
        let mut account = self.lock_one(uow.as_mut(), account_id).await?;

        account.debit(&amount)?;
        persist(uow.as_mut(), &mut account).await?;

        let event = LedgerEvent::FundsWithdrawn {
            account_id,
            amount: amount.value(),
            balance_after: account.balance().value(),
            occurred_at: Utc::now(),
        };
        let entry = record_event(uow.as_mut(), &event).await?;
        uow.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = %amount,
            balance = %account.balance(),
            "Withdrawal committed"
        );
        Ok(Committed::new(account, vec![entry]))
    }

    /// Move `amount` from `from` to `to` inside `uow`.
    ///
    /// Both rows must already be locked by `uow`. Both writes are staged in
    /// the same unit of work, so they commit or roll back together.
    pub async fn debit_credit(
        &self,
        uow: &mut dyn UnitOfWork,
        from: &mut Account,
        to: &mut Account,
        amount: &Amount,
    ) -> Result<(), LedgerError> {
        if from.id() == to.id() {
            return Err(DomainError::SameAccountTransfer.into());
        }
        to.ensure_active()?;
        from.debit(amount)?;
        to.credit(amount)?;

        persist(uow, from).await?;
        persist(uow, to).await?;
        Ok(())
    }

    async fn lock_one(&self, uow: &mut dyn UnitOfWork, account_id: Uuid) -> Result<Account, LedgerError> {
        self.lock(uow, &LockOrder::single(account_id))
            .await?
            .pop()
            .ok_or_else(|| LedgerError::not_found(account_id))
    }
}

/// Stage the write and reflect the new revision on the in-memory copy
async fn persist(uow: &mut dyn UnitOfWork, account: &mut Account) -> Result<(), LedgerError> {
    uow.save_account(account).await?;
    account.mark_persisted();
    Ok(())
}

/// Write the outbox row for `event` in the caller's unit of work
pub async fn record_event(uow: &mut dyn UnitOfWork, event: &LedgerEvent) -> Result<OutboxEntry, LedgerError> {
    let entry = OutboxEntry::from_event(event)?;
    uow.insert_outbox(&entry).await?;
    Ok(entry)
}

fn normalize_currency(currency: &str) -> Result<String, DomainError> {
    let code = currency.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::Validation(format!("invalid currency code: {}", currency)));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency(" usd ").unwrap(), "USD");
        assert!(normalize_currency("US").is_err());
        assert!(normalize_currency("U5D").is_err());
    }
}
