//! Transfer Coordinator
//!
//! Two-account balance moves on top of the ledger store.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Account, Amount, DomainError, LedgerEvent};

use super::{record_event, Committed, LedgerError, LedgerStore, LockOrder};

/// Both sides of a committed transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub transfer_id: Uuid,
    pub from: Account,
    pub to: Account,
    pub amount: Amount,
}

#[derive(Clone)]
pub struct TransferCoordinator {
    store: LedgerStore,
}

impl TransferCoordinator {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Move `amount` from `from_id` to `to_id`.
    ///
    /// Locks are always taken lowest id first, whatever the direction of the
    /// transfer. Any failure after locking drops the unit of work, which
    /// rolls back staged writes and releases both rows.
    pub async fn transfer(
        &self,
        from_id: Uuid,
        to_id: Uuid,
        amount: Amount,
    ) -> Result<Committed<TransferReceipt>, LedgerError> {
        let order = LockOrder::pair(from_id, to_id)?;

        let mut uow = self.store.begin().await?;
        let mut rows = self.store.lock(uow.as_mut(), &order).await?;
        let mut from = take_row(&mut rows, from_id)?;
        let mut to = take_row(&mut rows, to_id)?;

        from.ensure_active()?;
        to.ensure_active()?;
        if from.currency() != to.currency() {
            return Err(DomainError::CurrencyMismatch {
                from: from.currency().to_string(),
                to: to.currency().to_string(),
            }
            .into());
        }
        from.ensure_funds(&amount)?;

        self.store
            .debit_credit(uow.as_mut(), &mut from, &mut to, &amount)
            .await?;

        let transfer_id = Uuid::new_v4();
        let event = LedgerEvent::FundsTransferred {
            transfer_id,
            from_account_id: from_id,
            to_account_id: to_id,
            amount: amount.value(),
            occurred_at: Utc::now(),
        };
        let entry = record_event(uow.as_mut(), &event).await?;
        uow.commit().await?;

        tracing::info!(
            transfer_id = %transfer_id,
            from_account_id = %from_id,
            to_account_id = %to_id,
            amount = %amount,
            "Transfer committed"
        );

        Ok(Committed::new(
            TransferReceipt {
                transfer_id,
                from,
                to,
                amount,
            },
            vec![entry],
        ))
    }
}

fn take_row(rows: &mut Vec<Account>, account_id: Uuid) -> Result<Account, LedgerError> {
    let index = rows
        .iter()
        .position(|account| account.id() == account_id)
        .ok_or_else(|| LedgerError::not_found(account_id))?;
    Ok(rows.swap_remove(index))
}
