// =============================================================================
// Runtime configuration — loaded entirely from the environment
// =============================================================================
//
// Grounded in `original_source/services/fx/main.py`'s module-level `os.getenv`
// block; there is no JSON config file here (unlike the teacher's
// `runtime_config.json`) because this service has nothing a human needs to
// hand-edit between restarts.
// =============================================================================

use std::path::PathBuf;

use portfolio_common::telemetry::{env_or, env_u64_or};

#[derive(Debug, Clone)]
pub struct FxConfig {
    pub bind_addr: String,
    pub ttl_sec: u64,
    pub http_timeout_secs: u64,
    pub eodhd_key: String,
    pub db_path: PathBuf,
}

impl FxConfig {
    pub fn load() -> Self {
        let data_dir = env_or("DATA_DIR", "./data");
        std::fs::create_dir_all(&data_dir).ok();

        let raw_db_name = std::env::var("FX_CACHE_PATH")
            .or_else(|_| std::env::var("DB_PATH"))
            .unwrap_or_else(|_| "cache.db".to_string());
        let db_file_name = PathBuf::from(raw_db_name)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "cache.db".to_string());

        Self {
            bind_addr: env_or("FX_BIND_ADDR", "0.0.0.0:8001"),
            ttl_sec: env_u64_or("FX_TTL_SEC", 82_800),
            http_timeout_secs: env_u64_or("HTTP_TIMEOUT", 8),
            eodhd_key: env_or("EODHD_KEY", "").trim().to_string(),
            db_path: PathBuf::from(data_dir).join(db_file_name),
        }
    }
}
