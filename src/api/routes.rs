//! API Routes
//!
//! HTTP endpoint definitions for the ledger service and the transaction
//! service.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::domain::{
    Account, Amount, LedgerTransaction, OutboxEntry, TransactionRequest, TransactionType,
};
use crate::error::AppError;
use crate::ledger::TransferReceipt;
use crate::orchestrator::TransactionOrchestrator;
use crate::service::LedgerService;

use super::middleware::logging_middleware;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// =========================================================================
// Request types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub owner_id: Uuid,
    pub currency: String,
    #[serde(default)]
    pub overdraft_limit: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub account_id: Uuid,
    #[serde(default)]
    pub target_account_id: Option<Uuid>,
    pub amount: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn parse_amount(raw: &str) -> Result<Amount, AppError> {
    raw.trim()
        .parse::<Amount>()
        .map_err(|e| AppError::Domain(crate::domain::DomainError::InvalidAmount(e.to_string())))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

// =========================================================================
// Ledger service
// =========================================================================

/// Router for the ledger service
pub fn ledger_router(service: LedgerService) -> Router {
    let api = Router::new()
        .route("/accounts", post(open_account))
        .route("/accounts/:account_id", get(get_account))
        .route("/accounts/:account_id/close", post(close_account))
        .route("/accounts/:account_id/deposit", post(deposit))
        .route("/accounts/:account_id/withdraw", post(withdraw))
        .route("/transfers", post(transfer))
        .route("/outbox/:outbox_id", get(get_outbox_entry))
        .layer(middleware::from_fn(logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn open_account(
    State(service): State<LedgerService>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let account = service
        .open_account(request.owner_id, &request.currency, request.overdraft_limit)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_account(
    State(service): State<LedgerService>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(service.get_account(account_id).await?))
}

async fn close_account(
    State(service): State<LedgerService>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(service.close_account(account_id).await?))
}

async fn deposit(
    State(service): State<LedgerService>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<Account>, AppError> {
    let amount = parse_amount(&request.amount)?;
    Ok(Json(service.deposit(account_id, amount).await?))
}

async fn withdraw(
    State(service): State<LedgerService>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<Account>, AppError> {
    let amount = parse_amount(&request.amount)?;
    Ok(Json(service.withdraw(account_id, amount).await?))
}

async fn transfer(
    State(service): State<LedgerService>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferReceipt>, AppError> {
    let amount = parse_amount(&request.amount)?;
    let receipt = service
        .transfer(request.from_account_id, request.to_account_id, amount)
        .await?;
    Ok(Json(receipt))
}

async fn get_outbox_entry(
    State(service): State<LedgerService>,
    Path(outbox_id): Path<Uuid>,
) -> Result<Json<OutboxEntry>, AppError> {
    let entry = service
        .get_outbox_entry(outbox_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("outbox entry {}", outbox_id)))?;
    Ok(Json(entry))
}

// =========================================================================
// Transaction service
// =========================================================================

/// Router for the transaction service
pub fn transaction_router(orchestrator: TransactionOrchestrator) -> Router {
    let api = Router::new()
        .route("/transactions", post(create_transaction))
        .route("/transactions/:reference", get(get_transaction))
        .layer(middleware::from_fn(logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

/// Execute a customer transaction. The `Idempotency-Key` header wins over
/// the body field when both are present.
async fn create_transaction(
    State(orchestrator): State<TransactionOrchestrator>,
    headers: HeaderMap,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<Json<LedgerTransaction>, AppError> {
    let amount = parse_amount(&request.amount)?;
    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or(request.idempotency_key);

    let transaction = orchestrator
        .execute(TransactionRequest {
            account_id: request.account_id,
            target_account_id: request.target_account_id,
            amount,
            transaction_type: request.transaction_type,
            idempotency_key,
        })
        .await?;
    Ok(Json(transaction))
}

async fn get_transaction(
    State(orchestrator): State<TransactionOrchestrator>,
    Path(reference): Path<String>,
) -> Result<Json<LedgerTransaction>, AppError> {
    let transaction = orchestrator
        .get_transaction(&reference)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", reference)))?;
    Ok(Json(transaction))
}
