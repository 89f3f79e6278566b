//! Transaction service
//!
//! Customer-facing transaction API. Records each request and drives it
//! through the ledger service over HTTP.

use std::net::SocketAddr;

use ledger_core::api;
use ledger_core::server::{init_tracing, shutdown_signal, transaction_stack};
use ledger_core::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.transaction_service_port).parse()?;
    tracing::info!(
        ledger_service_url = %config.ledger_service_url,
        max_attempts = config.orchestrator_max_attempts,
        "Starting transaction service"
    );

    let (orchestrator, pool) = transaction_stack(&config).await?;

    let app = api::transaction_router(orchestrator);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    if let Some(pool) = pool {
        pool.close().await;
    }

    Ok(())
}
