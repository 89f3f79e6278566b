//! Row lock ordering and the in-process lock manager.
//!
//! Every unit of work acquires account locks in ascending id order. Two
//! operations touching the same pair in opposite directions therefore queue
//! on the same first row and can never wait on each other in a cycle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::DomainError;

use super::LedgerError;

/// A set of account ids in canonical (ascending, de-duplicated) order.
///
/// The only way to hand ids to a unit of work for locking is through this
/// type, so no call site can pick its own order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOrder(Vec<Uuid>);

impl LockOrder {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
        let mut ids: Vec<Uuid> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    pub fn single(id: Uuid) -> Self {
        Self(vec![id])
    }

    /// Order for a two-account move; rejects `from == to` before any lock
    pub fn pair(from: Uuid, to: Uuid) -> Result<Self, DomainError> {
        if from == to {
            return Err(DomainError::SameAccountTransfer);
        }
        Ok(Self::new([from, to]))
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Tracks which rows a unit of work holds and refuses out-of-order requests.
#[derive(Debug, Default)]
pub struct HeldLocks {
    held: Vec<Uuid>,
}

impl HeldLocks {
    /// Ids from `order` not yet held. Fails if any of them sorts below a row
    /// that is already held.
    pub fn admit(&self, order: &LockOrder) -> Result<Vec<Uuid>, LedgerError> {
        let fresh: Vec<Uuid> = order
            .ids()
            .iter()
            .copied()
            .filter(|id| !self.held.contains(id))
            .collect();

        if let (Some(&highest), Some(&first)) = (self.held.iter().max(), fresh.first()) {
            if first < highest {
                return Err(LedgerError::LockOrderViolation {
                    requested: first,
                    held: highest,
                });
            }
        }
        Ok(fresh)
    }

    pub fn record(&mut self, id: Uuid) {
        self.held.push(id);
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.held.contains(id)
    }
}

type RowTable = DashMap<Uuid, Arc<Mutex<()>>>;

/// Drop the slot for `account_id` once nobody holds or waits on it. The
/// count check and the removal happen under the shard lock, the same lock
/// `acquire` takes to clone a slot, so a waiter can never lose its mutex.
fn release_slot(rows: &RowTable, account_id: Uuid) {
    rows.remove_if(&account_id, |_, row| Arc::strong_count(row) == 1);
}

/// Guard for one locked row. Dropping it unlocks the row and frees the
/// table slot when no one else is queued on it.
pub struct RowGuard {
    account_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    rows: Arc<RowTable>,
}

impl RowGuard {
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }
}

impl fmt::Debug for RowGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowGuard")
            .field("account_id", &self.account_id)
            .finish()
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        self.guard.take();
        release_slot(&self.rows, self.account_id);
    }
}

/// Exclusive per-account locks for the in-memory store. Only rows that are
/// held or waited on occupy a slot.
#[derive(Debug, Default)]
pub struct LockManager {
    rows: Arc<RowTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows currently held or waited on
    pub fn active_slots(&self) -> usize {
        self.rows.len()
    }

    /// Lock one row, waiting at most `timeout`
    pub async fn acquire(&self, account_id: Uuid, timeout: Duration) -> Result<RowGuard, LedgerError> {
        let row = self.rows.entry(account_id).or_default().clone();

        match tokio::time::timeout(timeout, row.lock_owned()).await {
            Ok(guard) => Ok(RowGuard {
                account_id,
                guard: Some(guard),
                rows: self.rows.clone(),
            }),
            Err(_) => {
                release_slot(&self.rows, account_id);
                tracing::warn!(
                    account_id = %account_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Row lock acquisition timed out"
                );
                Err(LedgerError::LockTimeout {
                    account_id,
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Lock every row of `order`, ascending. On failure the rows already
    /// taken are released before returning.
    pub async fn acquire_all(
        &self,
        order: &LockOrder,
        timeout: Duration,
    ) -> Result<Vec<(Uuid, RowGuard)>, LedgerError> {
        let mut guards = Vec::with_capacity(order.len());
        for &id in order.ids() {
            let guard = self.acquire(id, timeout).await?;
            guards.push((id, guard));
        }
        Ok(guards)
    }
}
