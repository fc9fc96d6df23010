// =============================================================================
// HTTP surface — webhook ingress, dev test route, WebApp auth
// =============================================================================
//
// Ports `original_source/services/telegram_router/app/api.py`. The webhook
// handler does the minimum work needed before acking: secret-header check,
// idempotency short-circuit, then `process_text` under the per-chat lock
// added in `app_state::with_chat_lock` (spec §5/§9, P7). The rendered pages
// are hand ed to `enqueue_reply` and the handler returns without waiting for
// outbound delivery, matching spec §4.9 point 5.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::app_state::AppState;
use crate::engine;
use crate::models::{TelegramAuthIn, TelegramAuthOut, TelegramUpdate, TestRouteIn, TestRouteOut};
use crate::webapp_auth;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/telegram/test", post(telegram_test))
        .route("/auth/telegram", post(auth_telegram))
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true, "ts": chrono::Utc::now().timestamp() }))
}

/// `POST /webhook` — Telegram's delivery endpoint. Always acks with 200 once
/// the secret header and payload shape check out; a malformed or non-text
/// update is a silent no-op rather than an error, since Telegram retries
/// non-2xx responses.
async fn webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: axum::body::Bytes) -> impl IntoResponse {
    if let Some(expected) = state.config.telegram_webhook_secret.as_deref() {
        let provided = headers.get("X-Telegram-Bot-Api-Secret-Token").and_then(|v| v.to_str().ok()).unwrap_or("");
        if provided != expected {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "webhook payload did not parse as a Telegram update");
            return StatusCode::OK.into_response();
        }
    };

    let Some((chat_id, update_id, sender, text)) = update.text_message() else {
        return StatusCode::OK.into_response();
    };

    state
        .with_chat_lock(chat_id, || async {
            if state.idempotency.seen(chat_id, update_id) {
                return;
            }
            let sender_id = sender.id;
            let pages = engine::process_text(&state, chat_id, sender_id, &sender, &text).await;
            state.enqueue_reply(chat_id, pages);
        })
        .await;

    StatusCode::OK.into_response()
}

/// `POST /telegram/test` — dev-mode entry point that drives `process_text`
/// directly, bypassing Telegram signing and idempotency so an operator (or a
/// test harness) can exercise the conversational state machine synchronously.
async fn telegram_test(State(state): State<Arc<AppState>>, Json(body): Json<TestRouteIn>) -> impl IntoResponse {
    let sender_id = body.sender_id.unwrap_or(body.chat_id);
    let sender = crate::models::TelegramUser { id: sender_id, ..Default::default() };
    let pages = state.with_chat_lock(body.chat_id, || engine::process_text(&state, body.chat_id, sender_id, &sender, &body.text)).await;
    Json(TestRouteOut { pages })
}

/// `POST /auth/telegram` — validates a Telegram WebApp `initData` string.
async fn auth_telegram(State(state): State<Arc<AppState>>, Json(body): Json<TelegramAuthIn>) -> impl IntoResponse {
    let Some(bot_token) = state.config.telegram_bot_token.as_deref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "detail": "bot token not configured" }))).into_response();
    };
    match webapp_auth::validate_init_data(&body.init_data, bot_token) {
        Some(auth) => Json(TelegramAuthOut { valid: true, user_id: auth.user_id }).into_response(),
        None => Json(TelegramAuthOut { valid: false, user_id: None }).into_response(),
    }
}
