//! Message bus seam
//!
//! `HttpBroker` posts to a REST proxy in front of the bus. `LogBroker` only
//! logs and is what a development setup without a bus runs with.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::OutboxEntry;

use super::BrokerError;

#[async_trait]
pub trait MessageBroker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send the entry's payload to its topic, keyed by aggregate id
    async fn send(&self, entry: &OutboxEntry) -> Result<(), BrokerError>;
}

/// Body posted to the REST proxy
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProducerRecord<'a> {
    message_id: String,
    key: String,
    event_type: &'a str,
    value: &'a str,
}

/// Broker reached over HTTP: `POST {base_url}/topics/{topic}`
pub struct HttpBroker {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpBroker {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, BrokerError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }
}

#[async_trait]
impl MessageBroker for HttpBroker {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, entry: &OutboxEntry) -> Result<(), BrokerError> {
        let url = format!("{}/topics/{}", self.base_url, entry.topic);
        let record = ProducerRecord {
            message_id: entry.id.to_string(),
            key: entry.aggregate_id.to_string(),
            event_type: &entry.event_type,
            value: &entry.payload,
        };

        let response = self
            .client
            .post(&url)
            .json(&record)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BrokerError::Timeout(self.request_timeout.as_millis() as u64)
                } else {
                    BrokerError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Broker that only writes the message to the log
#[derive(Debug, Default)]
pub struct LogBroker;

#[async_trait]
impl MessageBroker for LogBroker {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, entry: &OutboxEntry) -> Result<(), BrokerError> {
        tracing::info!(
            outbox_id = %entry.id,
            topic = %entry.topic,
            key = %entry.aggregate_id,
            event_type = %entry.event_type,
            payload = %entry.payload,
            "Event published"
        );
        Ok(())
    }
}
