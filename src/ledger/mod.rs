//! Ledger module
//!
//! Balance state, pessimistic row locking and two-account transfers.

mod coordinator;
mod error;
mod lock;
mod store;
mod unit_of_work;

pub use coordinator::{TransferCoordinator, TransferReceipt};
pub use error::{LedgerError, LedgerErrorKind};
pub use lock::{HeldLocks, LockManager, LockOrder, RowGuard};
pub use store::{record_event, Committed, LedgerStore};
pub use unit_of_work::{LedgerRepository, UnitOfWork};
