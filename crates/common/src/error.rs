// =============================================================================
// Error taxonomy shared by every backend service
// =============================================================================
//
// `ErrorCode` is the wire-level vocabulary from the envelope contract; every
// service boundary maps its internal failures onto one of these before they
// ever leave the process. `AppError` is the internal, `thiserror`-based type
// services return from `Result`; it carries enough detail to build an
// `ErrorBody` without re-deriving the message at the call site.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Coarse error classification surfaced in every envelope's `error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadInput,
    NotFound,
    Insufficient,
    Conflict,
    UpstreamError,
    RateLimit,
    Timeout,
    Internal,
}

impl ErrorCode {
    /// Whether a caller may safely retry the request unmodified.
    pub fn default_retriable(self) -> bool {
        matches!(self, Self::UpstreamError | Self::RateLimit | Self::Timeout)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BadInput => "BAD_INPUT",
            Self::NotFound => "NOT_FOUND",
            Self::Insufficient => "INSUFFICIENT",
            Self::Conflict => "CONFLICT",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::RateLimit => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

/// Internal error type every service's business logic returns.
///
/// Never leaks a stack trace to the caller: `into_error_body` renders a
/// single user-safe sentence plus optional structured `details`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub source: String,
    pub retriable: bool,
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(code: ErrorCode, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            retriable: code.default_retriable(),
            code,
            source: source.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_input(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadInput, source, message)
    }

    pub fn not_found(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, source, message)
    }

    pub fn insufficient(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Insufficient, source, message)
    }

    pub fn upstream(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamError, source, message)
    }

    pub fn internal(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, source, message)
    }

    pub fn into_body(self) -> crate::envelope::ErrorBody {
        crate::envelope::ErrorBody {
            code: self.code,
            message: self.message,
            source: self.source,
            retriable: self.retriable,
            details: self.details,
        }
    }
}

/// Transport-level failures (timeouts, connection resets, non-2xx bodies
/// that don't carry a parseable envelope) land here via `?` at adapter
/// boundaries, mirroring the teacher's `anyhow::Context` usage in
/// `binance::client`.
impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::new(ErrorCode::Timeout, "http", e.to_string())
        } else {
            AppError::upstream("http", e.to_string())
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::internal("sqlite", e.to_string())
    }
}
