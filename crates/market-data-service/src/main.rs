// =============================================================================
// market-data-service — batched quotes, benchmarks, and symbol metadata
// =============================================================================

mod app_state;
mod clients;
mod config;
mod db;
mod routes;
mod services;

use std::sync::Arc;

use tracing::{info, warn};

use crate::app_state::AppState;
use crate::config::MarketDataConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    portfolio_common::telemetry::init("market-data-service");

    let config = MarketDataConfig::load();
    info!(bind_addr = %config.bind_addr, db_path = ?config.db_path, "market-data-service configured");

    let state = Arc::new(AppState::new(config.clone())?);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "market-data-service listening");

    let app = routes::router(state);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "market-data-service server exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");
    server.abort();
    info!("market-data-service shut down complete");
    Ok(())
}
