// =============================================================================
// fx-service — currency-pair resolution with a persistent TTL cache
// =============================================================================

mod app_state;
mod cache;
mod config;
mod providers;
mod routes;

use std::sync::Arc;

use tracing::{info, warn};

use crate::app_state::AppState;
use crate::config::FxConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    portfolio_common::telemetry::init("fx-service");

    let config = FxConfig::load();
    info!(bind_addr = %config.bind_addr, ttl_sec = config.ttl_sec, db_path = ?config.db_path, "fx-service configured");

    let state = Arc::new(AppState::new(config.clone())?);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "fx-service listening");

    let app = routes::router(state);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "fx-service server exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");
    server.abort();
    info!("fx-service shut down complete");
    Ok(())
}
