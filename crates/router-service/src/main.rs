// =============================================================================
// router-service — Telegram conversational front-end
// =============================================================================

mod app_state;
mod config;
mod core;
mod dispatcher;
mod engine;
mod handlers;
mod models;
mod screens;
mod webapp_auth;
mod routes;

use std::sync::Arc;

use tracing::{info, warn};

use crate::app_state::{run_outbound_delivery, AppState};
use crate::config::RouterConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    portfolio_common::telemetry::init("router-service");

    let config = RouterConfig::load();
    info!(bind_addr = %config.bind_addr, registry_path = ?config.registry_path, "router-service configured");

    let (state, reply_rx) = AppState::new(config.clone())?;
    tokio::spawn(run_outbound_delivery(reply_rx));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "router-service listening");

    let app = routes::router(state);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "router-service server exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");
    server.abort();
    info!("router-service shut down complete");
    Ok(())
}
