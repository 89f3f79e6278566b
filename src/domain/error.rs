//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Business rule violations and domain invariant failures.
///
/// None of these are retryable: repeating the same request against the same
/// state yields the same answer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Debit would take the balance below `-overdraft_limit`
    #[error("Insufficient funds in account {account_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        account_id: Uuid,
        requested: Decimal,
        available: Decimal,
    },

    /// Account is closed and cannot process movements
    #[error("Account is closed: {0}")]
    AccountClosed(Uuid),

    /// Account still holds funds and cannot be closed
    #[error("Account {account_id} has non-zero balance {balance}")]
    NonZeroBalance { account_id: Uuid, balance: Decimal },

    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Transfer to same account
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    /// Transfer between accounts held in different currencies
    #[error("Currency mismatch: {from} -> {to}")]
    CurrencyMismatch { from: String, to: String },

    /// Request is structurally invalid
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(account_id: Uuid, requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            account_id,
            requested,
            available,
        }
    }

    /// Rejected before any lock or mutation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_) | Self::Validation(_) | Self::SameAccountTransfer
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::AccountNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_error() {
        let id = Uuid::new_v4();
        let err = DomainError::insufficient_funds(id, Decimal::new(2000, 0), Decimal::new(1000, 0));

        assert!(!err.is_validation());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("2000"));
        assert!(err.to_string().contains("1000"));
    }

    #[test]
    fn test_same_account_is_validation() {
        assert!(DomainError::SameAccountTransfer.is_validation());
        assert!(DomainError::AccountNotFound(Uuid::nil()).is_not_found());
    }
}
