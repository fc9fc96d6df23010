// =============================================================================
// The `{ok, data, partial, error, ts}` envelope — the one response shape
// every backend endpoint speaks.
// =============================================================================
//
// Every cross-service result travels as this envelope rather than as a
// thrown exception; only a genuinely unrecoverable programmer error panics.
// `partial` plus an attached `error` describes a degraded success (e.g. the
// market-data aggregator resolved some but not all requested symbols).
// =============================================================================

use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub source: String,
    #[serde(default)]
    pub retriable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub ts: DateTime<Utc>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            partial: None,
            error: None,
            ts: Utc::now(),
        }
    }

    /// Degraded success: some data resolved, some didn't.
    pub fn ok_partial(data: T, error: ErrorBody) -> Self {
        Self {
            ok: true,
            data: Some(data),
            partial: Some(true),
            error: Some(error),
            ts: Utc::now(),
        }
    }

    pub fn err(error: ErrorBody) -> Envelope<T> {
        Envelope {
            ok: false,
            data: None,
            partial: None,
            error: Some(error),
            ts: Utc::now(),
        }
    }

    pub fn from_app_error(e: AppError) -> Envelope<T> {
        Self::err(e.into_body())
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Status code mapping used by services whose HTTP boundary cares (the FX
/// service's `400`/`502` contract in spec §6.4); most endpoints stay 200 and
/// let `ok:false` carry the failure, matching the FastAPI origin.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::BadInput => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,
        ErrorCode::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::Insufficient | ErrorCode::Conflict => StatusCode::OK,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
