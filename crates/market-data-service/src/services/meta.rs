// =============================================================================
// Symbol metadata classification
// =============================================================================
//
// Ports `original_source/services/market_data/app/services/meta.py`.
// =============================================================================

use serde::{Deserialize, Serialize};

use portfolio_common::symbols::{infer_asset_class, infer_market_currency, normalize_symbol};

use crate::app_state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaPayload {
    pub symbol: String,
    pub asset_class: String,
    pub market: String,
    pub currency: String,
}

pub fn get_meta(state: &AppState, raw_symbol: &str) -> anyhow::Result<MetaPayload> {
    let symbol = normalize_symbol(raw_symbol);
    let key = format!("meta:{symbol}");

    if let Some(cached) = state.db.cache_get("meta_cache", &key) {
        if let Ok(payload) = serde_json::from_str::<MetaPayload>(&cached) {
            return Ok(payload);
        }
    }

    let (market, currency) = infer_market_currency(&symbol);
    let asset_class = infer_asset_class(&symbol);

    let payload = MetaPayload {
        symbol,
        asset_class: asset_class.to_string(),
        market: market.to_string(),
        currency: currency.to_string(),
    };
    state.db.cache_set("meta_cache", &key, &serde_json::to_string(&payload)?, state.config.meta_ttl_sec)?;
    Ok(payload)
}
