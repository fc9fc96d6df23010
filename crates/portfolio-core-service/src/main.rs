// =============================================================================
// portfolio-core-service — positions, cash, transactions, and allocation
// =============================================================================

mod app_state;
mod config;
mod db;
mod market_client;
mod models;
mod routes;
mod service;

use std::sync::Arc;

use tracing::{info, warn};

use crate::app_state::AppState;
use crate::config::PortfolioConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    portfolio_common::telemetry::init("portfolio-core-service");

    let config = PortfolioConfig::load();
    info!(bind_addr = %config.bind_addr, db_path = ?config.db_path, "portfolio-core-service configured");

    let state = Arc::new(AppState::new(config.clone())?);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "portfolio-core-service listening");

    let app = routes::router(state);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "portfolio-core-service server exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");
    server.abort();
    info!("portfolio-core-service shut down complete");
    Ok(())
}
