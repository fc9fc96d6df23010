// =============================================================================
// Upstream FX providers — EODHD (forex real-time) and exchangerate.host (ECB)
// =============================================================================
//
// Ports `original_source/services/fx/main.py`'s provider functions one for
// one. Each provider returns `(rate, source_label)` so the caller can chain
// fallbacks exactly as the original does.
// =============================================================================

use std::time::Duration;

use rust_decimal::Decimal;
use tracing::instrument;

pub struct Providers {
    client: reqwest::Client,
    eodhd_key: String,
}

impl Providers {
    pub fn new(eodhd_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build fx http client");
        Self { client, eodhd_key }
    }

    /// EODHD quotes EURUSD.FOREX as USD-per-EUR; invert to get USD_EUR.
    #[instrument(skip(self))]
    pub async fn usd_eur_from_eodhd(&self) -> Option<(Decimal, &'static str)> {
        if self.eodhd_key.is_empty() {
            return None;
        }
        let url = "https://eodhd.com/api/real-time/EURUSD.FOREX";
        let resp = self
            .client
            .get(url)
            .query(&[("api_token", self.eodhd_key.as_str()), ("fmt", "json")])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let data: serde_json::Value = resp.json().await.ok()?;
        let data = first_if_array(data);
        let eurusd = extract_price(&data)?;
        if eurusd <= Decimal::ZERO {
            return None;
        }
        Some((Decimal::ONE / eurusd, "eodhd"))
    }

    #[instrument(skip(self))]
    pub async fn usd_eur_from_ecb(&self) -> Option<(Decimal, &'static str)> {
        let resp = self
            .client
            .get("https://api.exchangerate.host/latest")
            .query(&[("base", "USD"), ("symbols", "EUR")])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let js: serde_json::Value = resp.json().await.ok()?;
        let rate: Decimal = js.get("rates")?.get("EUR")?.as_f64()?.try_into().ok()?;
        if rate <= Decimal::ZERO {
            return None;
        }
        Some((rate, "exchangerate.host-ecb"))
    }

    #[instrument(skip(self))]
    pub async fn pair_from_exchangerate_host(&self, base: &str, quote: &str) -> Option<(Decimal, &'static str)> {
        let url = format!("https://api.exchangerate.host/latest?base={base}&symbols={quote}");
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let js: serde_json::Value = resp.json().await.ok()?;
        let rate: Decimal = js.get("rates")?.get(quote)?.as_f64()?.try_into().ok()?;
        if rate <= Decimal::ZERO {
            return None;
        }
        Some((rate, "exchangerate.host"))
    }

    #[instrument(skip(self))]
    pub async fn pair_from_eodhd(&self, base: &str, quote: &str) -> Option<(Decimal, &'static str)> {
        if self.eodhd_key.is_empty() {
            return None;
        }
        let symbol = format!("{base}{quote}.FOREX");
        let url = format!("https://eodhd.com/api/real-time/{symbol}");
        let resp = self
            .client
            .get(&url)
            .query(&[("api_token", self.eodhd_key.as_str()), ("fmt", "json")])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let data: serde_json::Value = resp.json().await.ok()?;
        let data = first_if_array(data);
        let rate = extract_price(&data)?;
        if rate <= Decimal::ZERO {
            return None;
        }
        Some((rate, "eodhd"))
    }
}

fn first_if_array(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Array(mut a) if !a.is_empty() => a.remove(0),
        other => other,
    }
}

fn extract_price(data: &serde_json::Value) -> Option<Decimal> {
    let raw = data
        .get("close")
        .or_else(|| data.get("price"))
        .or_else(|| data.get("last"))?;
    raw.as_f64().and_then(|f| Decimal::try_from(f).ok())
}
