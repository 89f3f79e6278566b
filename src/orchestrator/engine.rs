//! Transaction Orchestrator
//!
//! Records a customer money movement, drives it through the ledger with a
//! bounded retry on lock contention, and finalizes the record as SUCCESS or
//! FAILED.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::{
    Amount, DomainError, LedgerTransaction, TransactionRequest, TransactionType,
};

use super::{DownstreamError, LedgerApi, TransactionRepository, TransactionStoreError};

/// Reference numbers tried before giving up on a collision streak
const MAX_REFERENCE_ATTEMPTS: usize = 3;

/// Bounded retry for transient ledger failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 3)
    pub max_attempts: u32,
    /// Fixed pause between attempts (default: 1 second)
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Rejected before anything was recorded
    #[error(transparent)]
    Validation(#[from] DomainError),

    /// Recorded, attempted and finalized as FAILED
    #[error("Transaction {} failed: {error}", .transaction.reference_number)]
    Failed {
        transaction: Box<LedgerTransaction>,
        error: DownstreamError,
    },

    #[error("Transaction store error: {0}")]
    Repository(#[from] TransactionStoreError),
}

/// The single ledger call a request maps to
#[derive(Debug, Clone, Copy)]
enum LedgerCall {
    Deposit { account_id: Uuid, amount: Amount },
    Withdraw { account_id: Uuid, amount: Amount },
    Transfer { from: Uuid, to: Uuid, amount: Amount },
}

impl LedgerCall {
    fn from_request(request: &TransactionRequest) -> Result<Self, DomainError> {
        request.validate()?;
        let account_id = request.account_id;
        let amount = request.amount;
        match (request.transaction_type, request.target_account_id) {
            (TransactionType::Deposit, _) => Ok(LedgerCall::Deposit { account_id, amount }),
            (TransactionType::Withdrawal, _) => Ok(LedgerCall::Withdraw { account_id, amount }),
            (TransactionType::Transfer, Some(to)) => Ok(LedgerCall::Transfer {
                from: account_id,
                to,
                amount,
            }),
            (TransactionType::Transfer, None) => Err(DomainError::Validation(
                "transfer requires a target account".to_string(),
            )),
        }
    }
}

enum Recorded {
    New(LedgerTransaction),
    Replay(LedgerTransaction),
}

#[derive(Clone)]
pub struct TransactionOrchestrator {
    ledger: Arc<dyn LedgerApi>,
    transactions: Arc<dyn TransactionRepository>,
    retry: RetryPolicy,
}

impl TransactionOrchestrator {
    pub fn new(ledger: Arc<dyn LedgerApi>, transactions: Arc<dyn TransactionRepository>) -> Self {
        Self {
            ledger,
            transactions,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Execute one customer request.
    ///
    /// A request carrying an idempotency key that was seen before returns
    /// the stored record, whatever its status, without calling the ledger.
    pub async fn execute(
        &self,
        request: TransactionRequest,
    ) -> Result<LedgerTransaction, OrchestratorError> {
        let call = LedgerCall::from_request(&request)?;

        if let Some(existing) = self.find_replay(&request).await? {
            return Ok(existing);
        }

        let mut transaction = match self.record_pending(&request).await? {
            Recorded::New(transaction) => transaction,
            Recorded::Replay(existing) => return Ok(existing),
        };

        tracing::info!(
            reference = %transaction.reference_number,
            transaction_type = %transaction.transaction_type,
            account_id = %transaction.account_id,
            amount = %transaction.amount,
            "Transaction recorded"
        );

        let (attempts, outcome) = self.call_with_retry(&transaction.reference_number, call).await;

        match outcome {
            Ok(()) => {
                transaction.succeed(attempts);
                self.transactions.update(&transaction).await?;
                tracing::info!(
                    reference = %transaction.reference_number,
                    attempts,
                    "Transaction succeeded"
                );
                Ok(transaction)
            }
            Err(error) => {
                transaction.fail(attempts, error.summary());
                self.transactions.update(&transaction).await?;
                tracing::warn!(
                    reference = %transaction.reference_number,
                    attempts,
                    error = %error,
                    "Transaction failed"
                );
                Err(OrchestratorError::Failed {
                    transaction: Box::new(transaction),
                    error,
                })
            }
        }
    }

    pub async fn get_transaction(
        &self,
        reference_number: &str,
    ) -> Result<Option<LedgerTransaction>, OrchestratorError> {
        Ok(self.transactions.find_by_reference(reference_number).await?)
    }

    async fn find_replay(
        &self,
        request: &TransactionRequest,
    ) -> Result<Option<LedgerTransaction>, OrchestratorError> {
        let Some(key) = request.idempotency_key.as_deref() else {
            return Ok(None);
        };
        let existing = self.transactions.find_by_idempotency_key(key).await?;
        if let Some(existing) = &existing {
            tracing::info!(
                idempotency_key = %key,
                reference = %existing.reference_number,
                status = %existing.status,
                in_flight = !existing.is_final(),
                "Replaying recorded transaction"
            );
        }
        Ok(existing)
    }

    /// Insert the PENDING record, drawing a new reference on collision
    async fn record_pending(&self, request: &TransactionRequest) -> Result<Recorded, OrchestratorError> {
        let mut transaction = LedgerTransaction::pending(request);

        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            match self.transactions.insert(&transaction).await {
                Ok(()) => return Ok(Recorded::New(transaction)),
                Err(TransactionStoreError::DuplicateReference(reference)) => {
                    tracing::warn!(reference = %reference, "Reference number collision");
                    transaction.regenerate_reference();
                }
                // Same key raced in between lookup and insert
                Err(TransactionStoreError::DuplicateIdempotencyKey(key)) => {
                    return match self.transactions.find_by_idempotency_key(&key).await? {
                        Some(existing) => Ok(Recorded::Replay(existing)),
                        None => Err(TransactionStoreError::DuplicateIdempotencyKey(key).into()),
                    };
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(TransactionStoreError::DuplicateReference(transaction.reference_number).into())
    }

    /// Call the ledger, retrying only transient failures. Returns the number
    /// of attempts made together with the last outcome.
    async fn call_with_retry(&self, reference: &str, call: LedgerCall) -> (i32, Result<(), DownstreamError>) {
        let max_attempts = self.retry.max_attempts.max(1) as i32;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.call_ledger(call).await {
                Ok(()) => return (attempt, Ok(())),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        reference = %reference,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Transient ledger failure, retrying"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => return (attempt, Err(e)),
            }
        }
    }

    async fn call_ledger(&self, call: LedgerCall) -> Result<(), DownstreamError> {
        match call {
            LedgerCall::Deposit { account_id, amount } => {
                self.ledger.deposit(account_id, amount).await.map(|_| ())
            }
            LedgerCall::Withdraw { account_id, amount } => {
                self.ledger.withdraw(account_id, amount).await.map(|_| ())
            }
            LedgerCall::Transfer { from, to, amount } => {
                self.ledger.transfer(from, to, amount).await.map(|_| ())
            }
        }
    }
}
