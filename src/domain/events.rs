//! Domain Events
//!
//! Facts published to other services through the outbox.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic for account lifecycle events
pub const ACCOUNT_EVENTS_TOPIC: &str = "account-events";

/// Topic for money movements
pub const TRANSACTION_EVENTS_TOPIC: &str = "transaction-events";

/// Events emitted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    AccountOpened {
        account_id: Uuid,
        owner_id: Uuid,
        currency: String,
        opened_at: DateTime<Utc>,
    },

    AccountClosed {
        account_id: Uuid,
        closed_at: DateTime<Utc>,
    },

    FundsDeposited {
        account_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
        occurred_at: DateTime<Utc>,
    },

    FundsWithdrawn {
        account_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
        occurred_at: DateTime<Utc>,
    },

    FundsTransferred {
        transfer_id: Uuid,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::AccountOpened { .. } => "AccountOpened",
            LedgerEvent::AccountClosed { .. } => "AccountClosed",
            LedgerEvent::FundsDeposited { .. } => "FundsDeposited",
            LedgerEvent::FundsWithdrawn { .. } => "FundsWithdrawn",
            LedgerEvent::FundsTransferred { .. } => "FundsTransferred",
        }
    }

    /// Key consumers use to de-duplicate and partition
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            LedgerEvent::AccountOpened { account_id, .. }
            | LedgerEvent::AccountClosed { account_id, .. }
            | LedgerEvent::FundsDeposited { account_id, .. }
            | LedgerEvent::FundsWithdrawn { account_id, .. } => *account_id,
            LedgerEvent::FundsTransferred {
                from_account_id, ..
            } => *from_account_id,
        }
    }

    /// Destination topic
    pub fn topic(&self) -> &'static str {
        match self {
            LedgerEvent::AccountOpened { .. } | LedgerEvent::AccountClosed { .. } => {
                ACCOUNT_EVENTS_TOPIC
            }
            _ => TRANSACTION_EVENTS_TOPIC,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_and_topic() {
        let event = LedgerEvent::AccountOpened {
            account_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            currency: "EUR".to_string(),
            opened_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "AccountOpened");
        assert_eq!(event.topic(), ACCOUNT_EVENTS_TOPIC);
    }

    #[test]
    fn test_transfer_keyed_by_source() {
        let from = Uuid::new_v4();
        let event = LedgerEvent::FundsTransferred {
            transfer_id: Uuid::new_v4(),
            from_account_id: from,
            to_account_id: Uuid::new_v4(),
            amount: Decimal::new(300, 0),
            occurred_at: Utc::now(),
        };
        assert_eq!(event.aggregate_id(), from);
        assert_eq!(event.topic(), TRANSACTION_EVENTS_TOPIC);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "FundsTransferred");
    }
}
