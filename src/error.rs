//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::ledger::LedgerError;
use crate::orchestrator::{DownstreamError, DownstreamErrorKind, OrchestratorError};
use crate::outbox::OutboxError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Layer errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Outbox(#[from] OutboxError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Downstream(#[from] DownstreamError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

type Parts = (StatusCode, &'static str, Option<String>);

impl AppError {
    /// Status, machine-readable code and optional details for this error
    pub fn parts(&self) -> Parts {
        match self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", Some(what.clone())),
            AppError::Domain(e) => domain_parts(e),
            AppError::Ledger(e) => ledger_parts(e),
            AppError::Outbox(OutboxError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, "outbox_entry_not_found", Some(id.to_string()))
            }
            AppError::Outbox(e) => {
                tracing::error!("Outbox error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "outbox_error", None)
            }
            AppError::Orchestrator(OrchestratorError::Validation(e)) => domain_parts(e),
            AppError::Orchestrator(OrchestratorError::Failed { transaction, error }) => {
                let (status, code, _) = downstream_parts(error);
                (
                    status,
                    code,
                    Some(format!("{}: {}", transaction.reference_number, error.summary())),
                )
            }
            AppError::Orchestrator(OrchestratorError::Repository(e)) => {
                tracing::error!("Transaction store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "transaction_store_error", None)
            }
            AppError::Downstream(e) => downstream_parts(e),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        }
    }

    /// Status and JSON body, resolved from a single `parts()` call
    pub fn to_status_and_body(&self) -> (StatusCode, ErrorResponse) {
        let (status, error_code, details) = self.parts();
        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };
        (status, body)
    }
}

fn domain_parts(e: &DomainError) -> Parts {
    match e {
        DomainError::InsufficientFunds { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds", Some(e.to_string()))
        }
        DomainError::AccountClosed(id) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "account_closed", Some(id.to_string()))
        }
        DomainError::NonZeroBalance { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "non_zero_balance", Some(e.to_string()))
        }
        DomainError::CurrencyMismatch { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "currency_mismatch", Some(e.to_string()))
        }
        DomainError::InvalidAmount(msg) => {
            (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
        }
        DomainError::AccountNotFound(id) => {
            (StatusCode::NOT_FOUND, "account_not_found", Some(id.to_string()))
        }
        DomainError::SameAccountTransfer => {
            (StatusCode::BAD_REQUEST, "same_account_transfer", None)
        }
        DomainError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
        }
    }
}

fn ledger_parts(e: &LedgerError) -> Parts {
    match e {
        LedgerError::Domain(domain) => domain_parts(domain),
        // Transient: the remote client keys its retry on these codes
        LedgerError::LockTimeout { account_id, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "lock_timeout", Some(account_id.to_string()))
        }
        LedgerError::ConcurrentModification { account_id, .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "concurrent_modification",
            Some(account_id.to_string()),
        ),
        LedgerError::Database(err) => {
            tracing::error!("Database error: {:?}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
        }
        other => {
            tracing::error!("Ledger error: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
        }
    }
}

fn downstream_parts(e: &DownstreamError) -> Parts {
    let details = Some(e.to_string());
    match e.kind {
        DownstreamErrorKind::BadRequest => (StatusCode::BAD_GATEWAY, "downstream_rejected", details),
        DownstreamErrorKind::NotFound => (StatusCode::BAD_GATEWAY, "downstream_missing", details),
        DownstreamErrorKind::AccessDenied => {
            (StatusCode::FORBIDDEN, "downstream_access_denied", details)
        }
        DownstreamErrorKind::Unavailable => {
            (StatusCode::SERVICE_UNAVAILABLE, "downstream_unavailable", details)
        }
        DownstreamErrorKind::Generic => (StatusCode::BAD_GATEWAY, "downstream_error", details),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_status_and_body();
        (status, Json(body)).into_response()
    }
}
