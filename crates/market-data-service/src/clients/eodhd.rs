// =============================================================================
// EODHD upstream client — batch real-time quotes and daily historical bars
// =============================================================================
//
// Ports `original_source/services/market_data/app/clients/eodhd.py`. Upstream
// field names vary by endpoint, so responses stay as raw `serde_json::Value`
// and the services layer picks fields defensively, matching the original's
// `.get(...)` chains.
// =============================================================================

use std::time::Duration;

use tracing::instrument;

pub struct EodhdClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl EodhdClient {
    pub fn new(base_url: String, token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("failed to build eodhd http client");
        Self { client, base_url: base_url.trim_end_matches('/').to_string(), token }
    }

    #[instrument(skip(self))]
    pub async fn batch_quotes(&self, symbols: &[String]) -> anyhow::Result<Vec<serde_json::Value>> {
        let joined = symbols.join(",");
        let url = format!("{}/real-time/{}", self.base_url, joined);
        let resp = self
            .client
            .get(&url)
            .query(&[("api_token", self.token.as_str()), ("fmt", "json")])
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        Ok(match body {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        })
    }

    #[instrument(skip(self))]
    pub async fn historical(&self, symbol: &str) -> anyhow::Result<Vec<serde_json::Value>> {
        let url = format!("{}/eod/{}", self.base_url, symbol);
        let resp = self
            .client
            .get(&url)
            .query(&[("api_token", self.token.as_str()), ("fmt", "json"), ("order", "d")])
            .send()
            .await?
            .error_for_status()?;
        let body: Vec<serde_json::Value> = resp.json().await?;
        Ok(body)
    }
}
