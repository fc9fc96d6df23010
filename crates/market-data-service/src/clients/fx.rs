// =============================================================================
// FX service client — fetches the current USD→EUR rate for quote conversion
// =============================================================================
//
// Ports `original_source/services/market_data/app/clients/fx.py`.
// =============================================================================

use std::time::Duration;

use rust_decimal::Decimal;
use tracing::instrument;

pub struct FxClient {
    client: reqwest::Client,
    base_url: String,
}

impl FxClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build fx http client");
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    #[instrument(skip(self))]
    pub async fn usd_to_eur(&self) -> anyhow::Result<Decimal> {
        let url = format!("{}/fx", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("pair", "USD_EUR")])
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        let rate_str = body.get("rate").ok_or_else(|| anyhow::anyhow!("fx response missing rate"))?;
        let rate: Decimal = match rate_str {
            serde_json::Value::Number(n) => n.to_string().parse()?,
            serde_json::Value::String(s) => s.parse()?,
            _ => anyhow::bail!("unexpected rate type in fx response"),
        };
        Ok(rate.round_dp(4))
    }
}
