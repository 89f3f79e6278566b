//! Common test utilities
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use ledger_core::domain::{Account, AccountStatus, Amount, OutboxEntry, OutboxStatus};
use ledger_core::ledger::LedgerRepository;
use ledger_core::orchestrator::{AccountView, DownstreamError, LedgerApi, TransferView};
use ledger_core::outbox::{BrokerError, EventPublisher, MessageBroker, OutboxRepository};
use ledger_core::storage::MemoryStore;
use ledger_core::LedgerService;

pub const LOCK_TIMEOUT: Duration = Duration::from_millis(500);
pub const SEND_TIMEOUT: Duration = Duration::from_millis(200);

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

// =========================================================================
// Brokers
// =========================================================================

/// Broker that can be taken down and brought back, or made to refuse
/// events of chosen aggregates
#[derive(Default)]
pub struct SwitchBroker {
    down: AtomicBool,
    refused: Mutex<HashSet<Uuid>>,
    sent: Mutex<Vec<Uuid>>,
}

impl SwitchBroker {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Fail every send for `aggregate_id` from now on
    pub fn refuse(&self, aggregate_id: Uuid) {
        self.refused.lock().insert(aggregate_id);
    }

    /// Outbox ids delivered so far, in delivery order
    pub fn sent(&self) -> Vec<Uuid> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MessageBroker for SwitchBroker {
    fn name(&self) -> &'static str {
        "switch"
    }

    async fn send(&self, entry: &OutboxEntry) -> Result<(), BrokerError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable("broker is down".to_string()));
        }
        if self.refused.lock().contains(&entry.aggregate_id) {
            return Err(BrokerError::Unreachable("destination refused".to_string()));
        }
        self.sent.lock().push(entry.id);
        Ok(())
    }
}

/// Broker that never answers
pub struct HangingBroker;

#[async_trait]
impl MessageBroker for HangingBroker {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn send(&self, _entry: &OutboxEntry) -> Result<(), BrokerError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

// =========================================================================
// In-memory ledger stack
// =========================================================================

pub struct TestLedger {
    pub store: Arc<MemoryStore>,
    pub broker: Arc<SwitchBroker>,
    pub publisher: EventPublisher,
    pub service: LedgerService,
}

impl TestLedger {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let broker = Arc::new(SwitchBroker::default());
        Self::with_broker(store, broker)
    }

    pub fn with_broker(store: Arc<MemoryStore>, broker: Arc<SwitchBroker>) -> Self {
        let outbox: Arc<dyn OutboxRepository> = store.clone();
        let ledger: Arc<dyn LedgerRepository> = store.clone();
        let publisher = EventPublisher::new(broker.clone(), outbox, SEND_TIMEOUT);
        let service = LedgerService::new(ledger, publisher.clone(), LOCK_TIMEOUT);
        Self {
            store,
            broker,
            publisher,
            service,
        }
    }

    /// Open an account and fund it with `balance`
    pub async fn funded_account(&self, balance: Decimal) -> Account {
        let account = self
            .service
            .open_account(Uuid::new_v4(), "USD", None)
            .await
            .unwrap();
        if balance > Decimal::ZERO {
            return self.service.deposit(account.id(), amount(balance)).await.unwrap();
        }
        account
    }

    pub async fn balance(&self, account_id: Uuid) -> Decimal {
        self.service.get_account(account_id).await.unwrap().balance().value()
    }

    /// Outbox entries for one aggregate, oldest first
    pub fn entries_for(&self, aggregate_id: Uuid) -> Vec<OutboxEntry> {
        let mut entries: Vec<OutboxEntry> = self
            .store
            .outbox_entries()
            .into_iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    /// Wait until every entry recorded so far for `aggregate_id` is SENT
    pub async fn wait_until_sent(&self, aggregate_id: Uuid) {
        for entry in self.entries_for(aggregate_id) {
            self.wait_for_status(entry.id, OutboxStatus::Sent).await;
        }
    }

    /// Poll until the entry reaches `status` or two seconds pass
    pub async fn wait_for_status(&self, id: Uuid, status: OutboxStatus) -> OutboxEntry {
        for _ in 0..200 {
            if let Some(entry) = self.store.get(id).await.unwrap() {
                if entry.status == status {
                    return entry;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("outbox entry {} never reached {}", id, status);
    }
}

// =========================================================================
// Scripted ledger
// =========================================================================

/// `LedgerApi` that answers from a queue of scripted outcomes, then
/// succeeds once the queue is empty
#[derive(Default)]
pub struct ScriptedLedger {
    outcomes: Mutex<VecDeque<DownstreamError>>,
    calls: AtomicUsize,
}

impl ScriptedLedger {
    pub fn failing_with(errors: Vec<DownstreamError>) -> Self {
        Self {
            outcomes: Mutex::new(errors.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<(), DownstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn view(account_id: Uuid, balance: Decimal) -> AccountView {
        AccountView {
            id: account_id,
            owner_id: Uuid::nil(),
            balance,
            currency: "USD".to_string(),
            status: AccountStatus::Active,
        }
    }
}

#[async_trait]
impl LedgerApi for ScriptedLedger {
    async fn deposit(&self, account_id: Uuid, amount: Amount) -> Result<AccountView, DownstreamError> {
        self.next().map(|_| Self::view(account_id, amount.value()))
    }

    async fn withdraw(&self, account_id: Uuid, _amount: Amount) -> Result<AccountView, DownstreamError> {
        self.next().map(|_| Self::view(account_id, Decimal::ZERO))
    }

    async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Amount,
    ) -> Result<TransferView, DownstreamError> {
        self.next().map(|_| TransferView {
            transfer_id: Uuid::new_v4(),
            from: Self::view(from_account_id, Decimal::ZERO),
            to: Self::view(to_account_id, amount.value()),
            amount: amount.value(),
        })
    }

    async fn get_account(&self, account_id: Uuid) -> Result<AccountView, DownstreamError> {
        self.next().map(|_| Self::view(account_id, Decimal::ZERO))
    }
}

pub fn lock_timeout_error() -> DownstreamError {
    DownstreamError::from_response(
        "ledger-service",
        "POST /api/v1/transfers",
        503,
        r#"{"error":"Timed out waiting for lock","error_code":"lock_timeout"}"#,
    )
}

pub fn insufficient_funds_error() -> DownstreamError {
    DownstreamError::from_response(
        "ledger-service",
        "POST /api/v1/transfers",
        422,
        r#"{"error":"Insufficient funds","error_code":"insufficient_funds"}"#,
    )
}

// =========================================================================
// PostgreSQL
// =========================================================================

/// Connect to the test database and clear it. Returns `None` when
/// `DATABASE_URL` is not set so callers can skip.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    if !ledger_core::db::check_schema(&pool).await.unwrap() {
        eprintln!("skipping: schema missing, run migrations/0001_ledger_core.sql");
        return None;
    }

    sqlx::query("TRUNCATE TABLE accounts, outbox_entries, ledger_transactions")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    Some(pool)
}
