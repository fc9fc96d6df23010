// =============================================================================
// /price and /fx rendering — ports
// `original_source/services/telegram_router/app/handlers/market.py::MarketHandler`
// =============================================================================

use serde_json::Value;

use crate::screens::{self, PriceRow};

/// Result of rendering `/price`: the pages, whether any requested symbol is
/// still missing (keeps the sticky session open per spec §4.5), and whether
/// the upstream envelope itself came back `partial`.
pub struct PriceRender {
    pub pages: Vec<String>,
    pub has_missing: bool,
}

pub fn render_price(data: &Value, error_details: Option<&Value>, partial: bool, requested: &[String], ttl_min: i64) -> PriceRender {
    let quotes = data.get("quotes").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    let requested_upper: Vec<String> = requested.iter().map(|s| s.to_ascii_uppercase()).collect();

    if quotes.is_empty() {
        if requested_upper.is_empty() {
            return PriceRender { pages: screens::price_prompt(ttl_min), has_missing: false };
        }
        return PriceRender { pages: screens::price_not_found(&requested_upper, ttl_min), has_missing: true };
    }

    let present: Vec<String> = quotes.iter().filter_map(|q| q.get("symbol").and_then(|s| s.as_str()).map(|s| s.to_ascii_uppercase())).collect();

    let explicit_failed: Vec<String> = error_details
        .and_then(|d| d.get("symbols_failed"))
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(|s| s.to_ascii_uppercase())).collect())
        .unwrap_or_default();

    // Upstream sometimes omits `details.symbols_failed` even on a partial
    // batch; derive it ourselves by diffing what we asked for against what
    // came back (a symbol match is a prefix match, since the upstream may
    // answer `AAPL.US` for a request of bare `AAPL`).
    let derived_missing: Vec<String> = if !requested_upper.is_empty() {
        requested_upper.iter().filter(|s| !present.iter().any(|p| p.starts_with(s.as_str()))).cloned().collect()
    } else {
        Vec::new()
    };

    let missing = if !explicit_failed.is_empty() { explicit_failed } else { derived_missing };
    let has_missing = !missing.is_empty();

    let rows: Vec<PriceRow> = quotes
        .iter()
        .map(|q| {
            let symbol = q.get("symbol").and_then(|s| s.as_str()).unwrap_or("").to_ascii_uppercase();
            let market = q.get("market").and_then(|s| s.as_str()).unwrap_or("").to_string();
            let now_eur = q.get("price_eur").and_then(|v| v.as_f64());
            let open_eur = q.get("open_eur").and_then(|v| v.as_f64());
            let pct = match (now_eur, open_eur) {
                (Some(n), Some(o)) if o != 0.0 => Some((n - o) / o * 100.0),
                _ => None,
            };
            PriceRow {
                symbol,
                now_eur: now_eur.map(|v| format!("€{v:.2}")),
                open_eur: open_eur.map(|v| format!("€{v:.2}")),
                pct,
                market,
                freshness: q.get("freshness").and_then(|s| s.as_str()).unwrap_or("").to_string(),
            }
        })
        .collect();

    let _ = partial;
    PriceRender { pages: screens::price_result(&rows, &missing), has_missing }
}

pub struct FxResult {
    pub pages: Vec<String>,
}

/// `fx_prompt:true` is the dispatcher's sentinel for "base/quote missing";
/// otherwise applies the EUR/USD inversion rule (upstream always answers in
/// `USD_EUR` terms) before rendering.
pub fn render_fx(data: &Value, base: &str, quote: &str, ttl_min: i64) -> FxResult {
    if data.get("fx_prompt").and_then(|v| v.as_bool()).unwrap_or(false) {
        return FxResult { pages: screens::fx_prompt(ttl_min) };
    }

    let pair = data.get("pair").and_then(|v| v.as_str()).unwrap_or("").to_ascii_uppercase();
    let rate = data.get("rate").and_then(|v| v.as_f64());
    let base_u = base.to_ascii_uppercase();
    let quote_u = quote.to_ascii_uppercase();
    let requested_pair = format!("{base_u}_{quote_u}");
    let reversed_pair = format!("{quote_u}_{base_u}");

    // Upstream isn't always symmetric wrt pair direction (e.g. it may only
    // know EURUSD, not USDEUR). Whenever the `pair` it answers with is the
    // reverse of what was requested, invert the rate for display.
    let display_rate = match rate {
        Some(r) if pair == reversed_pair && pair != requested_pair && r != 0.0 => Some(1.0 / r),
        other => other,
    };

    let rate_str = match display_rate {
        Some(r) => screens::strip_trailing_zeros_4dp(r),
        None => "?".to_string(),
    };

    FxResult { pages: screens::fx_result(&base_u, &quote_u, &rate_str) }
}

pub fn render_fx_error(base: &str, quote: &str, usage: &str, example: &str) -> Vec<String> {
    screens::fx_error(&base.to_ascii_uppercase(), &quote.to_ascii_uppercase(), usage, example)
}
