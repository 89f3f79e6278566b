//! Outbox entry
//!
//! A not-yet-confirmed domain event, written in the same unit of work as the
//! state change that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::LedgerEvent;

/// Delivery status of an outbox entry.
///
/// `Sent` is the only terminal state; `Failed` entries are picked up again by
/// the retry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown outbox status: {}", other)),
        }
    }
}

/// Persisted outbox row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub topic: String,
    /// Serialized event body, sent verbatim
    pub payload: String,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Build a PENDING entry for an event
    pub fn from_event(event: &LedgerEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_id: event.aggregate_id(),
            event_type: event.event_type().to_string(),
            topic: event.topic().to_string(),
            payload: serde_json::to_string(event)?,
            status: OutboxStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
        })
    }

    /// Apply the outcome of one delivery attempt
    pub fn record_attempt(&mut self, status: OutboxStatus, at: DateTime<Utc>) {
        self.status = status;
        self.attempts += 1;
        self.last_attempt_at = Some(at);
    }

    /// Key under which consumers de-duplicate redeliveries
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.aggregate_id, self.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn deposit_event() -> LedgerEvent {
        LedgerEvent::FundsDeposited {
            account_id: Uuid::new_v4(),
            amount: Decimal::new(100, 0),
            balance_after: Decimal::new(100, 0),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_event_is_pending() {
        let event = deposit_event();
        let entry = OutboxEntry::from_event(&event).unwrap();

        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.attempts, 0);
        assert!(entry.last_attempt_at.is_none());
        assert_eq!(entry.aggregate_id, event.aggregate_id());
        assert_eq!(entry.event_type, "FundsDeposited");

        let decoded: LedgerEvent = serde_json::from_str(&entry.payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_record_attempt() {
        let mut entry = OutboxEntry::from_event(&deposit_event()).unwrap();
        let now = Utc::now();
        entry.record_attempt(OutboxStatus::Failed, now);
        entry.record_attempt(OutboxStatus::Sent, now);

        assert_eq!(entry.status, OutboxStatus::Sent);
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.last_attempt_at, Some(now));
    }

    #[test]
    fn test_dedup_key_names_aggregate_and_event() {
        let event = deposit_event();
        let entry = OutboxEntry::from_event(&event).unwrap();

        assert_eq!(
            entry.dedup_key(),
            format!("{}:FundsDeposited", event.aggregate_id())
        );
    }

    #[test]
    fn test_persisted_shape_uses_camel_case() {
        let entry = OutboxEntry::from_event(&deposit_event()).unwrap();
        let json = serde_json::to_value(&entry).unwrap();

        assert!(json.get("aggregateId").is_some());
        assert!(json.get("lastAttemptAt").is_some());
        assert_eq!(json["status"], "PENDING");
    }
}
