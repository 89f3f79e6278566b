//! Process wiring shared by the two binaries: logging, backend selection
//! and shutdown signals.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db;
use crate::ledger::LedgerRepository;
use crate::orchestrator::{HttpLedgerClient, TransactionOrchestrator, TransactionRepository};
use crate::outbox::{EventPublisher, HttpBroker, LogBroker, MessageBroker, OutboxRepository};
use crate::service::LedgerService;
use crate::storage::{MemoryStore, PgStore};

/// Per-request timeout for calls from the transaction service to the ledger
const LEDGER_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Initialize tracing/logging
pub fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledger_core=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Everything the ledger service process runs on
pub struct LedgerStack {
    pub service: LedgerService,
    pub publisher: EventPublisher,
    pub pool: Option<PgPool>,
}

async fn connect(config: &Config) -> anyhow::Result<Option<PgPool>> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store");
        return Ok(None);
    };

    tracing::info!("Connecting to database...");
    let pool = db::connect(url, config.database_max_connections).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }
    tracing::info!("Database connected successfully");
    Ok(Some(pool))
}

fn repositories<S>(store: Arc<S>) -> (Arc<dyn LedgerRepository>, Arc<dyn OutboxRepository>)
where
    S: LedgerRepository + OutboxRepository + 'static,
{
    (store.clone(), store)
}

pub async fn ledger_stack(config: &Config) -> anyhow::Result<LedgerStack> {
    let broker: Arc<dyn MessageBroker> = match config.broker_url.as_deref() {
        Some(url) => Arc::new(HttpBroker::new(url, config.outbox_send_timeout)?),
        None => {
            tracing::warn!("BROKER_URL not set, events are only logged");
            Arc::new(LogBroker)
        }
    };

    let pool = connect(config).await?;
    let (ledger, outbox) = match &pool {
        Some(pool) => repositories(Arc::new(PgStore::new(pool.clone()))),
        None => repositories(Arc::new(MemoryStore::new())),
    };

    let publisher = EventPublisher::new(broker, outbox, config.outbox_send_timeout);
    let service = LedgerService::new(ledger, publisher.clone(), config.lock_timeout)
        .with_default_overdraft_limit(config.default_overdraft_limit);

    Ok(LedgerStack {
        service,
        publisher,
        pool,
    })
}

pub async fn transaction_stack(
    config: &Config,
) -> anyhow::Result<(TransactionOrchestrator, Option<PgPool>)> {
    let pool = connect(config).await?;
    let transactions: Arc<dyn TransactionRepository> = match &pool {
        Some(pool) => Arc::new(PgStore::new(pool.clone())),
        None => Arc::new(MemoryStore::new()),
    };

    let ledger = HttpLedgerClient::new(&config.ledger_service_url, LEDGER_REQUEST_TIMEOUT)?;
    let orchestrator = TransactionOrchestrator::new(Arc::new(ledger), transactions)
        .with_retry_policy(config.retry_policy());

    Ok((orchestrator, pool))
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
