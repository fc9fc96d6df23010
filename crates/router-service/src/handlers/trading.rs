// =============================================================================
// /buy and /sell rendering — ports
// `original_source/services/telegram_router/app/handlers/trading.py::TradingHandler`
// =============================================================================

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;

use portfolio_common::UserContext;

use crate::app_state::AppState;
use crate::core::registry::DispatchSpec;
use crate::dispatcher;
use crate::screens;

/// Resolves the price to display on a buy/sell success screen: the
/// caller-supplied price if any, else a best-effort quote lookup (bare
/// symbol, then `.US`), else the literal word "market".
pub async fn resolve_price_display(state: &AppState, symbol: &str, provided_price: Option<Decimal>) -> String {
    if let Some(p) = provided_price {
        return screens::euro(p);
    }
    match fetch_quote_price(state, symbol).await {
        Some(p) => screens::euro(p),
        None => "market".to_string(),
    }
}

async fn fetch_quote_price(state: &AppState, symbol: &str) -> Option<Decimal> {
    let base = symbol.trim().to_ascii_uppercase();
    if base.is_empty() {
        return None;
    }
    let mut candidates = vec![base.clone()];
    if !base.contains('.') {
        candidates.push(format!("{base}.US"));
    }

    let spec = DispatchSpec {
        service: Some("market_data".to_string()),
        method: Some("GET".to_string()),
        path: Some("/quote".to_string()),
        args_map: [("symbols".to_string(), "symbols".to_string())].into_iter().collect(),
    };
    // Dispatcher expects a user context even for a market-data call; this
    // is a background lookup with no chat attached, so a placeholder id is
    // fine — market-data ignores user context entirely.
    let placeholder_user = UserContext { user_id: 0, first_name: None, last_name: String::new(), username: None, language_code: None };

    for candidate in candidates {
        let mut values: HashMap<String, Value> = HashMap::new();
        values.insert("symbols".to_string(), Value::Array(vec![Value::String(candidate.clone())]));
        let result = dispatcher::dispatch(state, &spec, &values, &placeholder_user).await;
        if !result.ok {
            continue;
        }
        let quotes = result.data.get("quotes").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        if let Some(price) = extract_price(&quotes, &candidate) {
            return Some(price);
        }
    }
    None
}

fn extract_price(quotes: &[Value], target: &str) -> Option<Decimal> {
    let target_upper = target.to_ascii_uppercase();
    let mut fallback = None;
    for q in quotes {
        let symbol = q.get("symbol").and_then(|s| s.as_str()).unwrap_or("").to_ascii_uppercase();
        let price = q.get("price_eur").or_else(|| q.get("price")).and_then(value_to_decimal);
        let Some(price) = price else { continue };
        if symbol == target_upper {
            return Some(price);
        }
        if fallback.is_none() {
            fallback = Some(price);
        }
    }
    fallback
}

fn value_to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        _ => None,
    }
}

pub fn render_buy(symbol: &str, qty: Decimal, price_display: &str) -> Vec<String> {
    screens::buy_success(&symbol.to_ascii_uppercase(), &screens::quantity(qty), price_display)
}

pub fn render_sell(symbol: &str, qty: Decimal, price_display: &str) -> Vec<String> {
    screens::sell_success(&symbol.to_ascii_uppercase(), &screens::quantity(qty), price_display)
}
