// =============================================================================
// HTTP surface — `/quote`, `/benchmarks`, `/meta`, `/health`
// =============================================================================
//
// Ports `original_source/services/market_data/app/api.py`. Every endpoint
// speaks the shared `{ok, data, partial, error, ts}` envelope; user identity
// arrives as query parameters exactly like the original's `user_dep`.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use portfolio_common::envelope::{Envelope, ErrorBody};
use portfolio_common::error::ErrorCode;
use portfolio_common::symbols::normalize_symbol;

use crate::app_state::AppState;
use crate::services::{benchmarks, meta, quotes};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/quote", get(quote))
        .route("/benchmarks", get(benchmarks_endpoint))
        .route("/meta", get(meta_endpoint))
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true, "ts": chrono::Utc::now().timestamp(), "service": "market-data" , "db": state.config.db_path.display().to_string() }))
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

fn upsert_user(state: &AppState, u: &UserQuery) {
    if let Some(user_id) = u.user_id {
        state.db.upsert_user(
            user_id,
            u.first_name.as_deref(),
            u.last_name.as_deref().unwrap_or(""),
            u.username.as_deref(),
            u.language_code.as_deref(),
        );
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub symbols: String,
    #[serde(flatten)]
    pub user: UserQuery,
}

async fn quote(State(state): State<Arc<AppState>>, Query(q): Query<QuoteQuery>) -> impl IntoResponse {
    upsert_user(&state, &q.user);

    let syms: Vec<String> = q.symbols.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    if syms.is_empty() || syms.len() > 10 {
        return Envelope::<serde_json::Value>::err(ErrorBody {
            code: ErrorCode::BadInput,
            message: "max 10 symbols".to_string(),
            source: "market_data".to_string(),
            retriable: false,
            details: None,
        })
        .into_response();
    }

    match quotes::get_quotes(&state, &syms).await {
        Ok(payload) => Envelope::ok(serde_json::json!(payload)).into_response(),
        Err(e_batch) => {
            warn!(error = %e_batch, "batch quote fetch failed, retrying per-symbol");
            let mut collected = Vec::new();
            let mut failed = Vec::new();
            for s in &syms {
                match quotes::get_quotes(&state, std::slice::from_ref(s)).await {
                    Ok(payload) if !payload.quotes.is_empty() => collected.extend(payload.quotes),
                    _ => failed.push(s.clone()),
                }
            }

            if !collected.is_empty() {
                let error = if failed.is_empty() {
                    None
                } else {
                    Some(ErrorBody {
                        code: ErrorCode::NotFound,
                        message: format!("{} or more symbol(s) failed", failed.len()),
                        source: "eodhd".to_string(),
                        retriable: false,
                        details: Some(serde_json::json!({ "symbols_failed": failed })),
                    })
                };
                let data = serde_json::json!({ "quotes": collected });
                match error {
                    Some(eb) => Envelope::ok_partial(data, eb).into_response(),
                    None => Envelope::ok(data).into_response(),
                }
            } else {
                Envelope::<serde_json::Value>::err(ErrorBody {
                    code: ErrorCode::UpstreamError,
                    message: e_batch.to_string(),
                    source: "eodhd".to_string(),
                    retriable: true,
                    details: None,
                })
                .into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BenchmarksQuery {
    pub period: String,
    pub symbols: String,
    #[serde(flatten)]
    pub user: UserQuery,
}

async fn benchmarks_endpoint(State(state): State<Arc<AppState>>, Query(q): Query<BenchmarksQuery>) -> impl IntoResponse {
    upsert_user(&state, &q.user);

    if !matches!(q.period.as_str(), "d" | "w" | "m" | "y") {
        return Envelope::<serde_json::Value>::err(ErrorBody {
            code: ErrorCode::BadInput,
            message: "period must be one of d, w, m, y".to_string(),
            source: "market_data".to_string(),
            retriable: false,
            details: None,
        })
        .into_response();
    }

    let syms_n: Vec<String> = q.symbols.split(',').map(|s| normalize_symbol(s.trim())).filter(|s| !s.is_empty()).collect();

    match benchmarks::get_benchmarks(&state, &q.period, &syms_n).await {
        Ok(raw) => {
            let data = benchmarks::normalize_benchmarks(&q.period, &raw, &syms_n);
            Envelope::ok(data).into_response()
        }
        Err(e) => Envelope::<serde_json::Value>::err(ErrorBody {
            code: ErrorCode::UpstreamError,
            message: e.to_string(),
            source: "eodhd".to_string(),
            retriable: true,
            details: None,
        })
        .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct MetaQuery {
    pub symbol: String,
    #[serde(flatten)]
    pub user: UserQuery,
}

async fn meta_endpoint(State(state): State<Arc<AppState>>, Query(q): Query<MetaQuery>) -> impl IntoResponse {
    upsert_user(&state, &q.user);

    let data = match meta::get_meta(&state, &q.symbol) {
        Ok(d) => d,
        Err(e) => {
            return Envelope::<serde_json::Value>::err(ErrorBody {
                code: ErrorCode::Internal,
                message: e.to_string(),
                source: "market_data".to_string(),
                retriable: false,
                details: None,
            })
            .into_response()
        }
    };

    match quotes::get_quotes(&state, std::slice::from_ref(&data.symbol)).await {
        Ok(payload) if !payload.quotes.is_empty() => Envelope::ok(serde_json::json!(data)).into_response(),
        Ok(_) => Envelope::<serde_json::Value>::err(ErrorBody {
            code: ErrorCode::NotFound,
            message: "symbol not recognized".to_string(),
            source: "market_data".to_string(),
            retriable: false,
            details: Some(serde_json::json!({ "symbol": data.symbol })),
        })
        .into_response(),
        Err(e) => Envelope::<serde_json::Value>::err(ErrorBody {
            code: ErrorCode::UpstreamError,
            message: e.to_string(),
            source: "eodhd".to_string(),
            retriable: true,
            details: None,
        })
        .into_response(),
    }
}
