//! Domain module
//!
//! Core domain types and business rules.

pub mod account;
pub mod amount;
pub mod error;
pub mod events;
pub mod outbox;
pub mod transaction;

pub use account::{Account, AccountStatus};
pub use amount::{Amount, AmountError, Balance};
pub use error::DomainError;
pub use events::{LedgerEvent, ACCOUNT_EVENTS_TOPIC, TRANSACTION_EVENTS_TOPIC};
pub use outbox::{OutboxEntry, OutboxStatus};
pub use transaction::{
    generate_reference_number, LedgerTransaction, TransactionRequest, TransactionStatus,
    TransactionType,
};
