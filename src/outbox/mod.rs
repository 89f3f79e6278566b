//! Outbox module
//!
//! At-least-once propagation of ledger events: rows written with the
//! business change, delivered asynchronously, retried by the sweep in
//! `jobs`.

mod broker;
mod error;
mod publisher;
mod repository;

pub use broker::{HttpBroker, LogBroker, MessageBroker};
pub use error::{BrokerError, OutboxError};
pub use publisher::EventPublisher;
pub use repository::OutboxRepository;
