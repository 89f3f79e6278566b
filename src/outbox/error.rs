//! Outbox Errors

use uuid::Uuid;

/// Errors reading or updating outbox rows
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Outbox entry not found: {0}")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt outbox row: {0}")]
    CorruptRow(String),
}

/// Why a send to the message bus did not go through
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    #[error("Broker rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Broker send timed out after {0}ms")]
    Timeout(u64),
}
