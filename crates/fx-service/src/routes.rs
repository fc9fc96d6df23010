// =============================================================================
// HTTP surface — `GET /health`, `GET /fx`, `GET /fx/cache/{key}`
// =============================================================================
//
// Status codes follow spec §6.4 directly: 400 on a missing/malformed pair,
// 502 when every provider fails. This is one of the few boundaries in the
// system that doesn't speak the `{ok,...}` envelope on the happy path — it
// mirrors the FastAPI origin's plain JSON responses.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::app_state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/fx/usd-eur", get(usd_eur))
        .route("/fx", get(fx))
        .route("/fx/cache/:key", get(cache_inspect))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true, "ts": chrono::Utc::now().timestamp() }))
}

async fn usd_eur(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.usd_eur(false).await {
        Ok(q) => Json(q).into_response(),
        Err(e) => {
            warn!(error = %e, "usd_eur fetch failed");
            (StatusCode::BAD_GATEWAY, Json(serde_json::json!({ "detail": e.to_string() }))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FxQuery {
    pub pair: Option<String>,
    #[serde(default)]
    pub force: bool,
}

async fn fx(State(state): State<Arc<AppState>>, Query(q): Query<FxQuery>) -> impl IntoResponse {
    let raw = q.pair.unwrap_or_default().trim().to_ascii_uppercase();
    let Some((base, quote)) = raw.split_once('_') else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": "pair must be BASE_QUOTE with underscore" })),
        )
            .into_response();
    };
    let (base, quote) = (base.trim(), quote.trim());
    if base.is_empty() || quote.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": "pair must be BASE_QUOTE with underscore" })),
        )
            .into_response();
    }

    match state.pair(base, quote, q.force).await {
        Ok(quote) => Json(quote).into_response(),
        Err(e) => {
            warn!(error = %e, base, quote, "pair fetch failed");
            (StatusCode::BAD_GATEWAY, Json(serde_json::json!({ "detail": e.to_string() }))).into_response()
        }
    }
}

async fn cache_inspect(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> impl IntoResponse {
    let value = state.inspect_cache(&key);
    Json(serde_json::json!({
        "key": key.to_ascii_uppercase(),
        "cached": value.is_some(),
        "value": value,
    }))
}
