// =============================================================================
// Market-data service client — ports
// `original_source/services/portfolio_core/app/clients.py::MarketDataClient`
// =============================================================================
//
// Unlike fx-service and market-data-service, which persist their caches to
// sqlite, the original `MarketDataClient` keeps its quote/meta/benchmark
// caches as plain in-process dicts with an expiry timestamp. That is
// reproduced here with `parking_lot::RwLock<HashMap<...>>` rather than a
// database: this cache is a short-lived read-through in front of another one
// of our own services, not a durable store, so the teacher's lighter-weight
// in-memory style fits better than the sqlite pattern used for upstream
// provider caches.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

pub struct MarketDataClient {
    client: reqwest::Client,
    base_url: String,
    retries: u32,
    quote_cache: RwLock<HashMap<String, CacheEntry>>,
    meta_cache: RwLock<HashMap<String, CacheEntry>>,
    bench_cache: RwLock<HashMap<String, CacheEntry>>,
    quotes_ttl: Duration,
    meta_ttl: Duration,
    bench_ttl: Duration,
}

impl MarketDataClient {
    pub fn new(base_url: String, timeout_secs: u64, retries: u32, quotes_ttl_sec: u64, meta_ttl_sec: u64, bench_ttl_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build market-data http client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retries,
            quote_cache: RwLock::new(HashMap::new()),
            meta_cache: RwLock::new(HashMap::new()),
            bench_cache: RwLock::new(HashMap::new()),
            quotes_ttl: Duration::from_secs(quotes_ttl_sec),
            meta_ttl: Duration::from_secs(meta_ttl_sec),
            bench_ttl: Duration::from_secs(bench_ttl_sec),
        }
    }

    fn cache_get(cache: &RwLock<HashMap<String, CacheEntry>>, key: &str) -> Option<Value> {
        let guard = cache.read();
        guard.get(key).filter(|e| e.expires_at > Instant::now()).map(|e| e.value.clone())
    }

    fn cache_put(cache: &RwLock<HashMap<String, CacheEntry>>, key: String, value: Value, ttl: Duration) {
        cache.write().insert(key, CacheEntry { value, expires_at: Instant::now() + ttl });
    }

    /// Fetches quotes for `symbols` from the market-data `/quote` endpoint,
    /// reusing cached entries unless `force_refresh`. Also back-fills the
    /// cache for any symbol variant the batch response returned under a
    /// normalized form, matching the original's best-effort reindexing.
    pub async fn get_quotes(&self, symbols: &[String], force_refresh: bool) -> HashMap<String, Value> {
        let mut out = HashMap::new();
        let mut missing = Vec::new();

        if !force_refresh {
            for s in symbols {
                if let Some(v) = Self::cache_get(&self.quote_cache, s) {
                    out.insert(s.clone(), v);
                } else {
                    missing.push(s.clone());
                }
            }
        } else {
            missing = symbols.to_vec();
        }

        if missing.is_empty() {
            return out;
        }

        let url = format!("{}/quote", self.base_url);
        let joined = missing.join(",");
        let mut attempt = 0u32;
        loop {
            let resp = self.client.get(&url).query(&[("symbols", joined.as_str())]).send().await;
            match resp {
                Ok(r) => match r.json::<Value>().await {
                    Ok(body) => {
                        if body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
                            if let Some(quotes) = body.get("data").and_then(|d| d.get("quotes")).and_then(|q| q.as_array()) {
                                for q in quotes {
                                    if let Some(sym) = q.get("symbol").and_then(|v| v.as_str()) {
                                        out.insert(sym.to_string(), q.clone());
                                        Self::cache_put(&self.quote_cache, sym.to_string(), q.clone(), self.quotes_ttl);
                                        for requested in &missing {
                                            if requested.eq_ignore_ascii_case(sym) || sym.starts_with(&format!("{requested}.")) {
                                                out.insert(requested.clone(), q.clone());
                                                Self::cache_put(&self.quote_cache, requested.clone(), q.clone(), self.quotes_ttl);
                                            }
                                        }
                                    }
                                }
                            }
                        }
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "market-data /quote returned unparseable body");
                        break;
                    }
                },
                Err(e) => {
                    attempt += 1;
                    if attempt > self.retries {
                        warn!(error = %e, attempts = attempt, "market-data /quote failed after retries");
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
            }
        }
        out
    }

    /// Fetches metadata one symbol at a time (the original `/meta` endpoint
    /// only accepts one symbol per call), retrying each with the same
    /// `0.2s * attempt` backoff and skipping symbols that keep failing.
    pub async fn get_meta(&self, symbols: &[String]) -> HashMap<String, Value> {
        let mut out = HashMap::new();
        for symbol in symbols {
            if let Some(v) = Self::cache_get(&self.meta_cache, symbol) {
                out.insert(symbol.clone(), v);
                continue;
            }

            let url = format!("{}/meta", self.base_url);
            let mut attempt = 0u32;
            loop {
                let resp = self.client.get(&url).query(&[("symbol", symbol.as_str())]).send().await;
                match resp {
                    Ok(r) => match r.json::<Value>().await {
                        Ok(body) => {
                            if body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
                                if let Some(data) = body.get("data") {
                                    out.insert(symbol.clone(), data.clone());
                                    Self::cache_put(&self.meta_cache, symbol.clone(), data.clone(), self.meta_ttl);
                                }
                            }
                            break;
                        }
                        Err(_) => break,
                    },
                    Err(e) => {
                        attempt += 1;
                        if attempt > self.retries {
                            warn!(error = %e, symbol = %symbol, "market-data /meta failed after retries");
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                    }
                }
            }
        }
        out
    }

    /// Fetches a benchmark series for `symbols` at `period`, returning an
    /// empty object on total failure rather than propagating the error (the
    /// analytics endpoints that use this are always `partial: true`).
    pub async fn get_benchmarks(&self, symbols: &[String], period: &str) -> Value {
        let mut sorted = symbols.to_vec();
        sorted.sort();
        let key = format!("{period}|{}", sorted.join(","));
        if let Some(v) = Self::cache_get(&self.bench_cache, &key) {
            return v;
        }

        let url = format!("{}/benchmarks", self.base_url);
        let joined = symbols.join(",");
        let mut attempt = 0u32;
        loop {
            let resp = self.client.get(&url).query(&[("period", period), ("symbols", joined.as_str())]).send().await;
            match resp {
                Ok(r) => match r.json::<Value>().await {
                    Ok(body) => {
                        let data = body.get("data").cloned().unwrap_or_else(|| serde_json::json!({}));
                        Self::cache_put(&self.bench_cache, key, data.clone(), self.bench_ttl);
                        return data;
                    }
                    Err(_) => return serde_json::json!({}),
                },
                Err(e) => {
                    attempt += 1;
                    if attempt > self.retries {
                        warn!(error = %e, attempts = attempt, "market-data /benchmarks failed after retries");
                        return serde_json::json!({});
                    }
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
            }
        }
    }
}
