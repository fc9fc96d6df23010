// =============================================================================
// Shared service state, including per-user mutation serialization
// =============================================================================
//
// The ledger's concurrency model (spec's Concurrency & Resource Model
// section) requires mutations for a single user to execute one at a time
// while reads may proceed concurrently. `user_locks` hands out one
// `tokio::sync::Mutex<()>` per `user_id`, created lazily and kept for the
// life of the process; holding its guard across a whole mutation method
// (including its `_with_idempotency` check) serializes that user's writes
// without blocking unrelated users or any reader.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::PortfolioConfig;
use crate::db::Db;
use crate::market_client::MarketDataClient;

pub struct AppState {
    pub config: PortfolioConfig,
    pub db: Db,
    pub market: MarketDataClient,
    user_locks: SyncMutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl AppState {
    pub fn new(config: PortfolioConfig) -> anyhow::Result<Self> {
        let db = Db::open(&config.db_path)?;
        let market = MarketDataClient::new(
            config.market_data_base_url.clone(),
            config.market_data_timeout_secs,
            config.market_data_retries,
            config.quotes_cache_ttl_sec,
            config.meta_cache_ttl_sec,
            config.benchmark_cache_ttl_sec,
        );
        Ok(Self { config, db, market, user_locks: SyncMutex::new(HashMap::new()) })
    }

    fn lock_for(&self, user_id: i64) -> Arc<AsyncMutex<()>> {
        self.user_locks.lock().entry(user_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Runs `f` while holding the exclusive per-user lock, serializing this
    /// user's mutating operations against each other.
    pub async fn with_user_lock<F, Fut, T>(&self, user_id: i64, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        f().await
    }
}

pub type SharedState = Arc<AppState>;
