//! Ledger service
//!
//! Owns account balances. Serves the ledger REST API and runs the outbox
//! retry sweep in the background.

use std::net::SocketAddr;

use tokio::sync::watch;

use ledger_core::api;
use ledger_core::jobs::OutboxRetryScheduler;
use ledger_core::server::{init_tracing, ledger_stack, shutdown_signal};
use ledger_core::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(environment = %config.environment, "Starting ledger service");

    let stack = ledger_stack(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = OutboxRetryScheduler::with_config(stack.publisher.clone(), config.sweep_config())
        .start(shutdown_rx);

    let app = api::ledger_router(stack.service.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Outbox retry scheduler panicked");
    }
    if let Some(pool) = stack.pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}
