// =============================================================================
// Runtime configuration — ports
// `original_source/services/telegram_router/app/settings.py`
// =============================================================================

use std::path::PathBuf;

use portfolio_common::telemetry::{env_or, env_u64_or};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub bind_addr: String,
    pub registry_path: PathBuf,
    pub sessions_db_path: PathBuf,
    pub idempotency_db_path: PathBuf,
    pub session_ttl_sec: i64,
    pub idempotency_max_per_chat: i64,
    pub market_data_base_url: String,
    pub portfolio_core_base_url: String,
    pub fx_base_url: String,
    pub http_timeout_secs: u64,
    pub http_retries: u32,
    pub owner_ids: Vec<i64>,
    pub telegram_bot_token: Option<String>,
    pub telegram_webhook_secret: Option<String>,
    pub telegram_bot_username: Option<String>,
}

impl RouterConfig {
    pub fn load() -> Self {
        let data_dir = env_or("DATA_DIR", "./data");
        std::fs::create_dir_all(&data_dir).ok();

        let owner_ids = env_or("ROUTER_OWNER_IDS", "")
            .split(',')
            .filter_map(|s| s.trim().parse::<i64>().ok())
            .collect();

        Self {
            bind_addr: env_or("ROUTER_BIND_ADDR", "0.0.0.0:8004"),
            registry_path: PathBuf::from(env_or("REGISTRY_PATH", "registry.json")),
            sessions_db_path: PathBuf::from(&data_dir).join(env_or("SESSIONS_DB_FILE", "sessions.db")),
            idempotency_db_path: PathBuf::from(&data_dir).join(env_or("IDEMPOTENCY_DB_FILE", "idempotency.db")),
            session_ttl_sec: env_u64_or("ROUTER_SESSION_TTL_SEC", 300) as i64,
            idempotency_max_per_chat: env_u64_or("IDEMPOTENCY_MAX_PER_CHAT", 50) as i64,
            market_data_base_url: env_or("MARKET_DATA_URL", "http://127.0.0.1:8002"),
            portfolio_core_base_url: env_or("PORTFOLIO_CORE_URL", "http://127.0.0.1:8003"),
            fx_base_url: env_or("FX_URL", "http://127.0.0.1:8001"),
            http_timeout_secs: env_u64_or("HTTP_TIMEOUT_SEC", 8),
            http_retries: env_u64_or("HTTP_RETRIES", 2) as u32,
            owner_ids,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_webhook_secret: std::env::var("TELEGRAM_WEBHOOK_SECRET").ok(),
            telegram_bot_username: std::env::var("TELEGRAM_BOT_USERNAME").ok(),
        }
    }
}
