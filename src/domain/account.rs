//! Account
//!
//! Ledger account state. Accounts are only ever mutated through the ledger
//! store while their row lock is held, and are closed rather than deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Amount, Balance, DomainError};

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    #[default]
    Active,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "CLOSED" => Ok(Self::Closed),
            other => Err(format!("unknown account status: {}", other)),
        }
    }
}

/// Ledger account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: Uuid,

    /// Owning customer
    owner_id: Uuid,

    balance: Balance,

    /// ISO 4217 code
    currency: String,

    /// How far below zero the balance may go
    overdraft_limit: Decimal,

    /// Bumped on every persisted write. Writers must present the revision
    /// they read; a mismatch means someone outside the lock protocol wrote
    /// the row.
    revision: i64,

    status: AccountStatus,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a new account with zero balance
    pub fn open(owner_id: Uuid, currency: impl Into<String>, overdraft_limit: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            balance: Balance::zero(),
            currency: currency.into(),
            overdraft_limit,
            revision: 0,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild an account from its persisted row
    #[allow(clippy::too_many_arguments)]
    pub fn from_db_state(
        id: Uuid,
        owner_id: Uuid,
        balance: Decimal,
        currency: String,
        overdraft_limit: Decimal,
        revision: i64,
        status: AccountStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            balance: Balance::new(balance),
            currency,
            overdraft_limit,
            revision,
            status,
            created_at,
            updated_at,
        }
    }

    /// Credit (deposit) money to the account
    pub fn credit(&mut self, amount: &Amount) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.balance = self.balance.credit(amount);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Debit (withdraw) money from the account, honouring the overdraft limit
    pub fn debit(&mut self, amount: &Amount) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.ensure_funds(amount)?;
        self.balance = self.balance.debit(amount);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check that a debit of `amount` is allowed without applying it
    pub fn ensure_funds(&self, amount: &Amount) -> Result<(), DomainError> {
        if !self.balance.can_cover(amount, self.overdraft_limit) {
            return Err(DomainError::insufficient_funds(
                self.id,
                amount.value(),
                self.balance.available(self.overdraft_limit),
            ));
        }
        Ok(())
    }

    /// Close the account. Only empty accounts can be closed.
    pub fn close(&mut self) -> Result<(), DomainError> {
        self.ensure_active()?;
        if !self.balance.value().is_zero() {
            return Err(DomainError::NonZeroBalance {
                account_id: self.id,
                balance: self.balance.value(),
            });
        }
        self.status = AccountStatus::Closed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn ensure_active(&self) -> Result<(), DomainError> {
        match self.status {
            AccountStatus::Active => Ok(()),
            AccountStatus::Closed => Err(DomainError::AccountClosed(self.id)),
        }
    }

    /// Record that a write of this state was persisted
    pub(crate) fn mark_persisted(&mut self) {
        self.revision += 1;
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn overdraft_limit(&self) -> Decimal {
        self.overdraft_limit
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
