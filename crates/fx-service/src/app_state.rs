// =============================================================================
// Shared service state
// =============================================================================
//
// Mirrors the shape of the teacher's `AppState` (config + shared subsystems
// behind `Arc`), scaled down to what this service actually needs: a cache and
// a provider client, both already internally synchronized.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::FxCache;
use crate::config::FxConfig;
use crate::providers::Providers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxQuote {
    pub pair: String,
    pub rate: Decimal,
    pub source: String,
    pub fetched_at: i64,
    pub ttl_sec: u64,
}

pub struct AppState {
    pub config: FxConfig,
    pub cache: FxCache,
    pub providers: Providers,
}

impl AppState {
    pub fn new(config: FxConfig) -> anyhow::Result<Self> {
        let cache = FxCache::open(&config.db_path)?;
        let providers = Providers::new(
            config.eodhd_key.clone(),
            std::time::Duration::from_secs(config.http_timeout_secs),
        );
        Ok(Self { config, cache, providers })
    }

    pub async fn usd_eur(&self, force: bool) -> anyhow::Result<FxQuote> {
        let key = "fx:USD_EUR";
        if !force {
            if let Some(cached) = self.cache.get(key, self.config.ttl_sec) {
                if let Ok(q) = serde_json::from_value::<FxQuote>(cached) {
                    return Ok(q);
                }
            }
        }

        let (rate, source) = match self.providers.usd_eur_from_eodhd().await {
            Some(r) => r,
            None => self
                .providers
                .usd_eur_from_ecb()
                .await
                .ok_or_else(|| anyhow::anyhow!("failed to fetch USD_EUR from providers"))?,
        };

        let quote = FxQuote {
            pair: "USD_EUR".to_string(),
            rate,
            source: source.to_string(),
            fetched_at: Utc::now().timestamp(),
            ttl_sec: self.config.ttl_sec,
        };
        if let Err(e) = self.cache.put(key, &serde_json::to_value(&quote)?) {
            warn!(error = %e, "failed to persist fx cache entry");
        }
        Ok(quote)
    }

    pub async fn pair(&self, base: &str, quote: &str, force: bool) -> anyhow::Result<FxQuote> {
        let base = base.to_ascii_uppercase();
        let quote = quote.to_ascii_uppercase();

        if base == quote {
            return Ok(FxQuote {
                pair: format!("{base}_{quote}"),
                rate: Decimal::ONE,
                source: "identity".to_string(),
                fetched_at: Utc::now().timestamp(),
                ttl_sec: self.config.ttl_sec,
            });
        }

        if base == "USD" && quote == "EUR" {
            return self.usd_eur(force).await;
        }

        let key = format!("fx:{base}_{quote}");
        if !force {
            if let Some(cached) = self.cache.get(&key, self.config.ttl_sec) {
                if let Ok(q) = serde_json::from_value::<FxQuote>(cached) {
                    return Ok(q);
                }
            }
        }

        let fetched = match self.providers.pair_from_exchangerate_host(&base, &quote).await {
            Some(r) => Some(r),
            None => self.providers.pair_from_eodhd(&base, &quote).await,
        };
        let (rate, source) = fetched.ok_or_else(|| {
            anyhow::anyhow!("failed to fetch {base}_{quote} (market may be closed or symbol unsupported)")
        })?;

        let payload = FxQuote {
            pair: format!("{base}_{quote}"),
            rate,
            source: source.to_string(),
            fetched_at: Utc::now().timestamp(),
            ttl_sec: self.config.ttl_sec,
        };
        if let Err(e) = self.cache.put(&key, &serde_json::to_value(&payload)?) {
            warn!(error = %e, "failed to persist fx cache entry");
        }
        Ok(payload)
    }

    pub fn inspect_cache(&self, key: &str) -> Option<serde_json::Value> {
        self.cache.get(&format!("fx:{}", key.to_ascii_uppercase()), self.config.ttl_sec)
    }
}

pub type SharedState = Arc<AppState>;
