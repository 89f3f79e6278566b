//! ledger_core Library
//!
//! Money-movement core: account balances under pessimistic row locking, a
//! transactional outbox for ledger events and an orchestrator that drives
//! customer transactions through the ledger.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod jobs;
pub mod ledger;
pub mod orchestrator;
pub mod outbox;
pub mod server;
pub mod service;
pub mod storage;

mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, Balance, DomainError};
pub use error::{AppError, AppResult, ErrorResponse};
pub use service::LedgerService;
