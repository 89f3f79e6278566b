//! API Integration Tests
//!
//! Both routers driven through `oneshot` against the in-memory stack.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use ledger_core::api::{ledger_router, transaction_router};
use ledger_core::orchestrator::{InProcessLedger, RetryPolicy, TransactionOrchestrator};
use ledger_core::storage::MemoryStore;

mod common;
use common::TestLedger;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("not a decimal: {}", other),
    }
}

async fn open_funded(app: &Router, amount: &str) -> Uuid {
    let (status, account) = send(
        app,
        post(
            "/api/v1/accounts",
            json!({ "owner_id": Uuid::new_v4(), "currency": "USD" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "open failed: {}", account);
    let id: Uuid = serde_json::from_value(account["id"].clone()).unwrap();

    let (status, account) = send(
        app,
        post(
            &format!("/api/v1/accounts/{}/deposit", id),
            json!({ "amount": amount }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "deposit failed: {}", account);
    id
}

// =========================================================================
// Ledger service
// =========================================================================

#[tokio::test]
async fn test_transfer_e2e() {
    let ledger = TestLedger::new();
    let app = ledger_router(ledger.service.clone());

    let a = open_funded(&app, "1000.00").await;
    let b = open_funded(&app, "500.00").await;

    let (status, receipt) = send(
        &app,
        post(
            "/api/v1/transfers",
            json!({ "from_account_id": a, "to_account_id": b, "amount": "300.00" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "transfer failed: {}", receipt);
    assert_eq!(decimal(&receipt["amount"]), dec!(300));
    assert_eq!(decimal(&receipt["from"]["balance"]), dec!(700));
    assert_eq!(decimal(&receipt["to"]["balance"]), dec!(800));

    let (status, account) = send(&app, get(&format!("/api/v1/accounts/{}", a))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&account["balance"]), dec!(700));
    assert_eq!(account["status"], "ACTIVE");

    let (_, account) = send(&app, get(&format!("/api/v1/accounts/{}", b))).await;
    assert_eq!(decimal(&account["balance"]), dec!(800));
}

#[tokio::test]
async fn test_ledger_error_responses() {
    let ledger = TestLedger::new();
    let app = ledger_router(ledger.service.clone());
    let a = open_funded(&app, "1000").await;

    // Same account: 400
    let (status, body) = send(
        &app,
        post(
            "/api/v1/transfers",
            json!({ "from_account_id": a, "to_account_id": a, "amount": "10" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "same_account_transfer");

    // Overdraw: 422, balance untouched
    let (status, body) = send(
        &app,
        post(
            &format!("/api/v1/accounts/{}/withdraw", a),
            json!({ "amount": "2000" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "insufficient_funds");
    assert_eq!(ledger.balance(a).await, dec!(1000));

    // Bad amount: 400
    let (status, body) = send(
        &app,
        post(
            &format!("/api/v1/accounts/{}/deposit", a),
            json!({ "amount": "-5" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_amount");

    // Unknown account: 404
    let (status, body) = send(&app, get(&format!("/api/v1/accounts/{}", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "account_not_found");
}

#[tokio::test]
async fn test_outbox_entry_visible() {
    let ledger = TestLedger::new();
    let app = ledger_router(ledger.service.clone());
    let a = open_funded(&app, "10").await;

    let entry = ledger.entries_for(a).pop().unwrap();
    ledger.wait_until_sent(a).await;

    let (status, body) = send(&app, get(&format!("/api/v1/outbox/{}", entry.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["eventType"], "FundsDeposited");
    assert_eq!(body["status"], "SENT");

    let (status, _) = send(&app, get(&format!("/api/v1/outbox/{}", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_correlation_id() {
    let ledger = TestLedger::new();
    let app = ledger_router(ledger.service.clone());

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"OK");

    let correlation_id = Uuid::new_v4().to_string();
    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/accounts/{}", Uuid::new_v4()))
        .header("x-correlation-id", &correlation_id)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("x-correlation-id").unwrap(),
        correlation_id.as_str()
    );
}

// =========================================================================
// Transaction service
// =========================================================================

fn transaction_app(ledger: &TestLedger) -> Router {
    let orchestrator = TransactionOrchestrator::new(
        Arc::new(InProcessLedger::new(ledger.service.clone())),
        Arc::new(MemoryStore::new()),
    )
    .with_retry_policy(RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(10),
    });
    transaction_router(orchestrator)
}

#[tokio::test]
async fn test_transaction_idempotency_api() {
    let ledger = TestLedger::new();
    let a = ledger.funded_account(dec!(100)).await;
    let app = transaction_app(&ledger);

    let idempotency_key = Uuid::new_v4().to_string();
    let request = || {
        Request::builder()
            .method("POST")
            .uri("/api/v1/transactions")
            .header("content-type", "application/json")
            .header("Idempotency-Key", &idempotency_key)
            .body(Body::from(
                json!({ "account_id": a.id(), "amount": "50.00", "type": "DEPOSIT" }).to_string(),
            ))
            .unwrap()
    };

    let (status, first) = send(&app, request()).await;
    assert_eq!(status, StatusCode::OK, "first request failed: {}", first);
    assert_eq!(first["status"], "SUCCESS");
    assert_eq!(first["idempotency_key"], idempotency_key.as_str());

    let (status, second) = send(&app, request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["reference_number"], first["reference_number"]);

    // Applied once
    assert_eq!(ledger.balance(a.id()).await, dec!(150));

    let reference = first["reference_number"].as_str().unwrap();
    let (status, stored) = send(&app, get(&format!("/api/v1/transactions/{}", reference))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["attempts"], 1);
    assert_eq!(stored["transaction_type"], "DEPOSIT");

    let (status, body) = send(&app, get("/api/v1/transactions/TXN-19700101-AAAAAAAA")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "not_found");
}

#[tokio::test]
async fn test_transaction_rejected_by_ledger() {
    let ledger = TestLedger::new();
    let a = ledger.funded_account(dec!(100)).await;
    let b = ledger.funded_account(dec!(0)).await;
    let app = transaction_app(&ledger);

    let (status, body) = send(
        &app,
        post(
            "/api/v1/transactions",
            json!({
                "account_id": a.id(),
                "target_account_id": b.id(),
                "amount": "250",
                "type": "TRANSFER"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_code"], "downstream_rejected");
    assert!(body["details"].as_str().unwrap().contains("insufficient_funds"));

    // Same account never reaches the ledger
    let (status, body) = send(
        &app,
        post(
            "/api/v1/transactions",
            json!({
                "account_id": a.id(),
                "target_account_id": a.id(),
                "amount": "1",
                "type": "TRANSFER"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "same_account_transfer");
    assert_eq!(ledger.balance(a.id()).await, dec!(100));
}
