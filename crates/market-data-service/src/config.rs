// =============================================================================
// Runtime configuration
// =============================================================================
//
// Grounded in `original_source/services/market_data/app/settings.py`; the
// pydantic `Settings` class becomes a plain struct loaded from env vars the
// same way the teacher's `RuntimeConfig` reads `AURORA_*` overrides.
// =============================================================================

use std::path::PathBuf;

use portfolio_common::telemetry::{env_or, env_u64_or};

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub eodhd_base_url: String,
    pub eodhd_api_token: String,
    pub fx_base_url: String,
    pub quotes_ttl_sec: u64,
    pub bench_ttl_sec: u64,
    pub meta_ttl_sec: u64,
}

impl MarketDataConfig {
    pub fn load() -> Self {
        let data_dir = env_or("DATA_DIR", "./data");
        std::fs::create_dir_all(&data_dir).ok();
        let db_file = env_or("DB_PATH", "cache.db");
        let db_file_name = PathBuf::from(&db_file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "cache.db".to_string());

        Self {
            bind_addr: env_or("MARKET_DATA_BIND_ADDR", "0.0.0.0:8002"),
            db_path: PathBuf::from(data_dir).join(db_file_name),
            eodhd_base_url: env_or("EODHD_BASE_URL", "https://eodhd.com/api"),
            eodhd_api_token: env_or("EODHD_API_TOKEN", ""),
            fx_base_url: env_or("FX_URL", "http://127.0.0.1:8001"),
            quotes_ttl_sec: env_u64_or("QUOTES_TTL_SEC", 90),
            bench_ttl_sec: env_u64_or("BENCH_TTL_SEC", 900),
            meta_ttl_sec: env_u64_or("META_TTL_SEC", 86_400),
        }
    }
}
