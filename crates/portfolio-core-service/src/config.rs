// =============================================================================
// Runtime configuration
// =============================================================================
//
// Grounded in `original_source/services/portfolio_core/app/settings.py`.
// =============================================================================

use std::path::PathBuf;

use portfolio_common::telemetry::{env_or, env_u64_or};

#[derive(Debug, Clone)]
pub struct PortfolioConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub market_data_base_url: String,
    pub market_data_timeout_secs: u64,
    pub market_data_retries: u32,
    pub quotes_cache_ttl_sec: u64,
    pub meta_cache_ttl_sec: u64,
    pub benchmark_cache_ttl_sec: u64,
    pub default_stock_target_pct: i64,
    pub default_etf_target_pct: i64,
    pub default_crypto_target_pct: i64,
}

impl PortfolioConfig {
    pub fn load() -> Self {
        let data_dir = env_or("DATA_DIR", "./data");
        std::fs::create_dir_all(&data_dir).ok();
        let db_file = env_or("DB_PATH", "portfolio.db");
        let db_file_name = PathBuf::from(&db_file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "portfolio.db".to_string());

        let config = Self {
            bind_addr: env_or("PORTFOLIO_CORE_BIND_ADDR", "0.0.0.0:8003"),
            db_path: PathBuf::from(data_dir).join(db_file_name),
            market_data_base_url: env_or("MARKET_DATA_BASE_URL", "http://127.0.0.1:8002"),
            market_data_timeout_secs: env_u64_or("MARKET_DATA_TIMEOUT_SEC", 5),
            market_data_retries: env_u64_or("MARKET_DATA_RETRIES", 2) as u32,
            quotes_cache_ttl_sec: env_u64_or("QUOTES_CACHE_TTL_SEC", 90),
            meta_cache_ttl_sec: env_u64_or("META_CACHE_TTL_SEC", 86_400),
            benchmark_cache_ttl_sec: env_u64_or("BENCHMARK_CACHE_TTL_SEC", 900),
            default_stock_target_pct: env_u64_or("DEFAULT_STOCK_TARGET_PCT", 60) as i64,
            default_etf_target_pct: env_u64_or("DEFAULT_ETF_TARGET_PCT", 30) as i64,
            default_crypto_target_pct: env_u64_or("DEFAULT_CRYPTO_TARGET_PCT", 10) as i64,
        };

        let total = config.default_stock_target_pct + config.default_etf_target_pct + config.default_crypto_target_pct;
        assert_eq!(total, 100, "default allocation targets must sum to 100, got {total}");
        config
    }
}
