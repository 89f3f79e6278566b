//! Outbox Repository
//!
//! Read and status-update access to outbox rows. Rows are only ever inserted
//! through a ledger unit of work; this seam is what the publisher and the
//! retry sweep use afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{OutboxEntry, OutboxStatus};

use super::OutboxError;

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<OutboxEntry>, OutboxError>;

    /// Entries in `status`, never-attempted first, then least recently
    /// attempted. Repeated sweeps over a bounded batch therefore rotate
    /// through every entry.
    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, OutboxError>;

    /// PENDING entries created before `created_before` that were never
    /// attempted, oldest first
    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, OutboxError>;

    /// Store the outcome of one delivery attempt and return the updated row.
    ///
    /// An entry already SENT stays SENT even if a slower, duplicate attempt
    /// reports failure.
    async fn record_attempt(
        &self,
        id: Uuid,
        status: OutboxStatus,
        at: DateTime<Utc>,
    ) -> Result<OutboxEntry, OutboxError>;
}
