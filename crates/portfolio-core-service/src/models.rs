// =============================================================================
// Wire types and request payloads — ports
// `original_source/services/portfolio_core/app/models.py`
// =============================================================================

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use portfolio_common::error::ErrorCode;

/// Raised by `PortfolioService` mutation methods; mapped onto an `ErrorBody`
/// (and an HTTP status) at the routes layer. Mirrors `services.py::BusinessError`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct BusinessError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl BusinessError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Insufficient, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn into_app_error(self) -> portfolio_common::error::AppError {
        portfolio_common::error::AppError { code: self.code, message: self.message, source: "portfolio_core".to_string(), retriable: false, details: self.details }
    }
}

pub type BizResult<T> = Result<T, BusinessError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingSnapshot {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub asset_class: String,
    pub market: String,
    pub qty_total: Decimal,
    pub price_eur: Decimal,
    pub value_eur: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub total_value_eur: Decimal,
    pub cash_eur: Decimal,
    pub holdings: Vec<HoldingSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashBalance {
    pub cash_eur: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_id: i64,
    pub ts: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_eur: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_eur: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_delta_eur: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees_eur: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub stock_pct: i64,
    pub etf_pct: i64,
    pub crypto_pct: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddPositionRequest {
    pub op_id: String,
    pub symbol: String,
    pub qty: Decimal,
    #[serde(default)]
    pub asset_class: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemovePositionRequest {
    pub op_id: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashMutationRequest {
    pub op_id: String,
    pub amount_eur: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub op_id: String,
    pub symbol: String,
    pub qty: Decimal,
    #[serde(default)]
    pub price_eur: Option<Decimal>,
    #[serde(default)]
    pub fees_eur: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationEditRequest {
    pub op_id: String,
    pub stock_pct: i64,
    pub etf_pct: i64,
    pub crypto_pct: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameRequest {
    pub op_id: String,
    pub symbol: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxQuery {
    #[serde(default = "default_tx_limit")]
    pub limit: i64,
}

fn default_tx_limit() -> i64 {
    10
}

impl TxQuery {
    pub fn clamped_limit(&self) -> i64 {
        self.limit.clamp(1, 50)
    }
}

pub fn validate_trade_request(req: &TradeRequest) -> BizResult<()> {
    if req.qty <= Decimal::ZERO {
        return Err(BusinessError::bad_input("qty must be positive"));
    }
    if let Some(fees) = req.fees_eur {
        if fees < Decimal::ZERO {
            return Err(BusinessError::bad_input("fees_eur must not be negative"));
        }
    }
    Ok(())
}

pub fn validate_allocation_edit(req: &AllocationEditRequest) -> BizResult<()> {
    for pct in [req.stock_pct, req.etf_pct, req.crypto_pct] {
        if !(0..=100).contains(&pct) {
            return Err(BusinessError::bad_input("allocation percentages must be between 0 and 100"));
        }
    }
    Ok(())
}
