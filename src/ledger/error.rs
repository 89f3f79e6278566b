//! Ledger Errors
//!
//! Error types for ledger store and transfer operations.

use uuid::Uuid;

use crate::domain::DomainError;

/// Errors that can occur while mutating the ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Validation, business rule or not-found failure
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Row lock could not be acquired in time
    #[error("Timed out after {waited_ms}ms waiting for lock on account {account_id}")]
    LockTimeout { account_id: Uuid, waited_ms: u64 },

    /// Stored revision differs from the one read under lock
    #[error("Concurrent modification of account {account_id}: expected revision {expected}, found {found:?}")]
    ConcurrentModification {
        account_id: Uuid,
        expected: i64,
        found: Option<i64>,
    },

    /// Rows requested out of canonical order within one unit of work
    #[error("Lock order violation: account {requested} requested while holding {held}")]
    LockOrderViolation { requested: Uuid, held: Uuid },

    /// Write staged for a row the unit of work never locked
    #[error("Write to account {0} without holding its row lock")]
    NotLocked(Uuid),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid persisted data
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Coarse classification used by callers and the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorKind {
    Validation,
    BusinessRule,
    NotFound,
    Transient,
    Internal,
}

impl LedgerError {
    pub fn kind(&self) -> LedgerErrorKind {
        match self {
            LedgerError::Domain(e) if e.is_validation() => LedgerErrorKind::Validation,
            LedgerError::Domain(e) if e.is_not_found() => LedgerErrorKind::NotFound,
            LedgerError::Domain(_) => LedgerErrorKind::BusinessRule,
            LedgerError::LockTimeout { .. } | LedgerError::ConcurrentModification { .. } => {
                LedgerErrorKind::Transient
            }
            _ => LedgerErrorKind::Internal,
        }
    }

    /// Check if this error is retryable by the calling layer
    pub fn is_transient(&self) -> bool {
        self.kind() == LedgerErrorKind::Transient
    }

    pub fn not_found(account_id: Uuid) -> Self {
        LedgerError::Domain(DomainError::AccountNotFound(account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let timeout = LedgerError::LockTimeout {
            account_id: Uuid::new_v4(),
            waited_ms: 5000,
        };
        assert!(timeout.is_transient());

        let missing = LedgerError::not_found(Uuid::new_v4());
        assert_eq!(missing.kind(), LedgerErrorKind::NotFound);
        assert!(!missing.is_transient());

        let same = LedgerError::from(DomainError::SameAccountTransfer);
        assert_eq!(same.kind(), LedgerErrorKind::Validation);

        let funds = LedgerError::from(DomainError::AccountClosed(Uuid::nil()));
        assert_eq!(funds.kind(), LedgerErrorKind::BusinessRule);

        let corrupt = LedgerError::CorruptRow("bad status".to_string());
        assert_eq!(corrupt.kind(), LedgerErrorKind::Internal);
    }
}
