//! Ledger transaction record
//!
//! Client-side record kept by the transaction orchestrator. It is written
//! PENDING before the remote ledger is called and finalized afterwards.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Amount, DomainError};

/// Kind of ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(Self::Deposit),
            "WITHDRAWAL" => Ok(Self::Withdrawal),
            "TRANSFER" => Ok(Self::Transfer),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Request to move money through the remote ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub account_id: Uuid,
    #[serde(default)]
    pub target_account_id: Option<Uuid>,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Caller-chosen key; a repeated request with the same key is answered
    /// from the stored record instead of being executed again.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl TransactionRequest {
    pub fn deposit(account_id: Uuid, amount: Amount) -> Self {
        Self::new(account_id, None, amount, TransactionType::Deposit)
    }

    pub fn withdrawal(account_id: Uuid, amount: Amount) -> Self {
        Self::new(account_id, None, amount, TransactionType::Withdrawal)
    }

    pub fn transfer(from: Uuid, to: Uuid, amount: Amount) -> Self {
        Self::new(from, Some(to), amount, TransactionType::Transfer)
    }

    fn new(
        account_id: Uuid,
        target_account_id: Option<Uuid>,
        amount: Amount,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            account_id,
            target_account_id,
            amount,
            transaction_type,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Structural checks done before anything is persisted or called
    pub fn validate(&self) -> Result<(), DomainError> {
        match (self.transaction_type, self.target_account_id) {
            (TransactionType::Transfer, None) => Err(DomainError::Validation(
                "transfer requires a target account".to_string(),
            )),
            (TransactionType::Transfer, Some(target)) if target == self.account_id => {
                Err(DomainError::SameAccountTransfer)
            }
            (TransactionType::Deposit | TransactionType::Withdrawal, Some(_)) => {
                Err(DomainError::Validation(format!(
                    "{} does not take a target account",
                    self.transaction_type
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Orchestrator-side transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub target_account_id: Option<Uuid>,
    pub amount: Amount,
    pub transaction_type: TransactionType,
    pub reference_number: String,
    pub status: TransactionStatus,
    pub failure_reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// New PENDING record with a fresh reference number
    pub fn pending(request: &TransactionRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            target_account_id: request.target_account_id,
            amount: request.amount,
            transaction_type: request.transaction_type,
            reference_number: generate_reference_number(now),
            status: TransactionStatus::Pending,
            failure_reason: None,
            idempotency_key: request.idempotency_key.clone(),
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the reference number after a collision
    pub fn regenerate_reference(&mut self) {
        self.reference_number = generate_reference_number(self.created_at);
    }

    pub fn succeed(&mut self, attempts: i32) {
        self.status = TransactionStatus::Success;
        self.failure_reason = None;
        self.attempts = attempts;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, attempts: i32, reason: impl Into<String>) {
        self.status = TransactionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.attempts = attempts;
        self.updated_at = Utc::now();
    }

    pub fn is_final(&self) -> bool {
        self.status != TransactionStatus::Pending
    }
}

/// `TXN-YYYYMMDD-XXXXXXXX`
pub fn generate_reference_number(at: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("TXN-{}-{}", at.format("%Y%m%d"), suffix)
}
