//! Event Publisher
//!
//! Sends committed outbox entries to the message bus and records the
//! outcome on the entry. Delivery failures never reach the business caller:
//! the mutation has already committed and the retry sweep picks the entry up
//! again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::domain::{OutboxEntry, OutboxStatus};

use super::{BrokerError, MessageBroker, OutboxError, OutboxRepository};

#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn MessageBroker>,
    outbox: Arc<dyn OutboxRepository>,
    send_timeout: Duration,
}

impl EventPublisher {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        outbox: Arc<dyn OutboxRepository>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            outbox,
            send_timeout,
        }
    }

    pub fn outbox(&self) -> &Arc<dyn OutboxRepository> {
        &self.outbox
    }

    /// One delivery attempt: send, then store SENT or FAILED with the
    /// attempt time. Returns the status now stored on the entry.
    pub async fn deliver(&self, entry: &OutboxEntry) -> Result<OutboxStatus, OutboxError> {
        let outcome = match tokio::time::timeout(self.send_timeout, self.broker.send(entry)).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(self.send_timeout.as_millis() as u64)),
        };

        let status = match outcome {
            Ok(()) => {
                tracing::debug!(
                    outbox_id = %entry.id,
                    dedup_key = %entry.dedup_key(),
                    topic = %entry.topic,
                    broker = self.broker.name(),
                    "Outbox entry sent"
                );
                OutboxStatus::Sent
            }
            Err(e) => {
                tracing::warn!(
                    outbox_id = %entry.id,
                    dedup_key = %entry.dedup_key(),
                    topic = %entry.topic,
                    event_type = %entry.event_type,
                    broker = self.broker.name(),
                    error = %e,
                    "Outbox delivery failed"
                );
                OutboxStatus::Failed
            }
        };

        let updated = self.outbox.record_attempt(entry.id, status, Utc::now()).await?;
        Ok(updated.status)
    }

    /// Deliver in the background. The handle resolves to the stored status;
    /// callers that do not care can drop it.
    pub fn dispatch(&self, entry: OutboxEntry) -> JoinHandle<Result<OutboxStatus, OutboxError>> {
        let publisher = self.clone();
        tokio::spawn(async move {
            let result = publisher.deliver(&entry).await;
            if let Err(e) = &result {
                tracing::error!(
                    outbox_id = %entry.id,
                    error = %e,
                    "Could not record outbox delivery attempt"
                );
            }
            result
        })
    }

    pub fn dispatch_all(
        &self,
        entries: Vec<OutboxEntry>,
    ) -> Vec<JoinHandle<Result<OutboxStatus, OutboxError>>> {
        entries.into_iter().map(|entry| self.dispatch(entry)).collect()
    }
}
