//! Transaction orchestration
//!
//! Customer-facing transaction records on top of the ledger, with bounded
//! retry of lock contention and a normalized downstream error model.

mod client;
mod downstream;
mod engine;
mod local;
mod repository;

pub use client::{AccountView, HttpLedgerClient, LedgerApi, TransferView, LEDGER_SERVICE};
pub use downstream::{DownstreamError, DownstreamErrorKind, TRANSIENT_ERROR_CODES};
pub use engine::{OrchestratorError, RetryPolicy, TransactionOrchestrator};
pub use local::InProcessLedger;
pub use repository::{TransactionRepository, TransactionStoreError};
