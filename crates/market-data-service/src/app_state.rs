use std::sync::Arc;

use crate::clients::{eodhd::EodhdClient, fx::FxClient};
use crate::config::MarketDataConfig;
use crate::db::Db;

pub struct AppState {
    pub config: MarketDataConfig,
    pub db: Db,
    pub eodhd: EodhdClient,
    pub fx: FxClient,
}

impl AppState {
    pub fn new(config: MarketDataConfig) -> anyhow::Result<Self> {
        let db = Db::open(&config.db_path)?;
        let eodhd = EodhdClient::new(config.eodhd_base_url.clone(), config.eodhd_api_token.clone());
        let fx = FxClient::new(config.fx_base_url.clone());
        Ok(Self { config, db, eodhd, fx })
    }
}

pub type SharedState = Arc<AppState>;
