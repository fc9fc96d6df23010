// =============================================================================
// Batched quote resolution, EUR normalization, and freshness classification
// =============================================================================
//
// Ports `original_source/services/market_data/app/services/quotes.py`.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use portfolio_common::money::quantize_eur;
use portfolio_common::symbols::{infer_market_currency, normalize_symbol, symbol_suffix};
use portfolio_common::timez::classify_freshness;

use crate::app_state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteItem {
    pub symbol: String,
    pub market: String,
    pub currency: String,
    pub price: Decimal,
    pub price_eur: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_eur: Option<Decimal>,
    pub ts: DateTime<Utc>,
    pub provider: &'static str,
    pub freshness: &'static str,
    pub freshness_note: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotesPayload {
    pub quotes: Vec<QuoteItem>,
}

fn first_decimal(item: &serde_json::Value, keys: &[&str]) -> Option<Decimal> {
    for key in keys {
        if let Some(v) = item.get(key) {
            if let Some(d) = v.as_f64().and_then(|f| Decimal::try_from(f).ok()) {
                return Some(d);
            }
            if let Some(s) = v.as_str() {
                if let Ok(d) = s.parse::<Decimal>() {
                    return Some(d);
                }
            }
        }
    }
    None
}

fn truthy(item: &serde_json::Value, keys: &[&str]) -> bool {
    keys.iter().any(|k| item.get(*k).map(|v| v.as_bool().unwrap_or(false)).unwrap_or(false))
}

pub async fn get_quotes(state: &AppState, raw_symbols: &[String]) -> anyhow::Result<QuotesPayload> {
    let symbols_n: Vec<String> = raw_symbols.iter().map(|s| normalize_symbol(s)).collect();
    let key = format!("quotes:{}", symbols_n.join(","));

    if let Some(cached) = state.db.cache_get("quotes_cache", &key) {
        if let Ok(payload) = serde_json::from_str::<QuotesPayload>(&cached) {
            return Ok(payload);
        }
    }

    let raw = state.eodhd.batch_quotes(&symbols_n).await?;
    let usd_eur = state.fx.usd_to_eur().await?;

    let mut quotes = Vec::with_capacity(raw.len());
    for item in &raw {
        let code = item
            .get("code")
            .or_else(|| item.get("symbol"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let symbol = normalize_symbol(code);
        let (market, ccy) = infer_market_currency(&symbol);

        let Some(last) = first_decimal(item, &["close", "price", "last"]) else {
            continue;
        };
        let open_px = first_decimal(item, &["open"]);

        let (price_eur, open_eur) = if ccy == "USD" {
            (last * usd_eur, open_px.map(|o| o * usd_eur))
        } else {
            (last, open_px)
        };

        let ts = item
            .get("timestamp")
            .or_else(|| item.get("ts"))
            .and_then(|v| v.as_i64())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        let eod = truthy(item, &["is_eod", "eod"]);
        let delayed = truthy(item, &["is_delayed", "delayed"]);
        let freshness = classify_freshness(symbol_suffix(&symbol), ts, eod, delayed);

        quotes.push(QuoteItem {
            symbol,
            market: market.to_string(),
            currency: ccy.to_string(),
            price: quantize_eur(last),
            price_eur: quantize_eur(price_eur),
            open: open_px.map(quantize_eur),
            open_eur: open_eur.map(quantize_eur),
            ts,
            provider: "EODHD",
            freshness: freshness.label(),
            freshness_note: freshness.note(),
        });
    }

    let payload = QuotesPayload { quotes };
    state.db.cache_set("quotes_cache", &key, &serde_json::to_string(&payload)?, state.config.quotes_ttl_sec)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_decimal_accepts_any_provider_price_field_name() {
        let close = serde_json::json!({"close": 101.5});
        let price = serde_json::json!({"price": 101.5});
        let last = serde_json::json!({"last": "101.5"});
        for item in [&close, &price, &last] {
            assert_eq!(first_decimal(item, &["close", "price", "last"]), Some(Decimal::try_from(101.5).unwrap()));
        }
    }

    #[test]
    fn first_decimal_is_none_when_no_key_present() {
        let item = serde_json::json!({"unrelated": 1});
        assert_eq!(first_decimal(&item, &["close", "price", "last"]), None);
    }

    #[test]
    fn truthy_checks_any_of_the_given_flags() {
        let eod = serde_json::json!({"is_eod": true});
        let delayed = serde_json::json!({"delayed": true});
        assert!(truthy(&eod, &["is_eod", "eod"]));
        assert!(truthy(&delayed, &["is_delayed", "delayed"]));
        assert!(!truthy(&serde_json::json!({}), &["is_eod", "eod"]));
    }
}
