// =============================================================================
// Tracing / environment bootstrap shared by every service binary
// =============================================================================

use tracing_subscriber::EnvFilter;

/// Install a `tracing_subscriber::fmt` layer gated by `RUST_LOG`, defaulting
/// to `info`. Also loads a local `.env` file if present, matching the
/// teacher's `main.rs` bootstrap.
pub fn init(service_name: &str) {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(service = service_name, "starting up");
}

/// Read an environment variable, falling back to `default` and logging the
/// fallback at debug level so missing config is discoverable without being
/// noisy.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_u64_or(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn env_usize_or(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
