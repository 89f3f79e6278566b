//! Transaction Repository
//!
//! Storage for the orchestrator's local transaction records.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::LedgerTransaction;

#[derive(Debug, thiserror::Error)]
pub enum TransactionStoreError {
    #[error("Reference number already in use: {0}")]
    DuplicateReference(String),

    #[error("Idempotency key already in use: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt transaction row: {0}")]
    CorruptRow(String),
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persist a new record. Reference numbers and idempotency keys are
    /// unique across all records.
    async fn insert(&self, transaction: &LedgerTransaction) -> Result<(), TransactionStoreError>;

    /// Overwrite status, failure reason and attempt count of an existing record
    async fn update(&self, transaction: &LedgerTransaction) -> Result<(), TransactionStoreError>;

    async fn find_by_reference(
        &self,
        reference_number: &str,
    ) -> Result<Option<LedgerTransaction>, TransactionStoreError>;

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<LedgerTransaction>, TransactionStoreError>;
}
