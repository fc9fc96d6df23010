// =============================================================================
// SQLite-backed key/value cache — ports `original_source/services/fx/main.py`'s
// `cache_get`/`cache_put` pair.
// =============================================================================
//
// Reads and writes happen on a dedicated blocking connection guarded by a
// mutex, following the teacher's preference for `parking_lot` locks over
// holding a pool; the fx cache only ever sees single-digit writes per minute.
// =============================================================================

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::Value;

pub struct FxCache {
    conn: Mutex<Connection>,
}

impl FxCache {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache (
                k  TEXT PRIMARY KEY,
                v  TEXT NOT NULL,
                ts INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Returns `None` if the key is absent or older than `ttl_sec`.
    pub fn get(&self, key: &str, ttl_sec: u64) -> Option<Value> {
        let conn = self.conn.lock();
        let row: rusqlite::Result<(String, i64)> = conn.query_row(
            "SELECT v, ts FROM cache WHERE k = ?1",
            params![key],
            |r| Ok((r.get(0)?, r.get(1)?)),
        );
        let (v, ts) = row.ok()?;
        let now = chrono::Utc::now().timestamp();
        if now - ts > ttl_sec as i64 {
            return None;
        }
        serde_json::from_str(&v).ok()
    }

    pub fn put(&self, key: &str, payload: &Value) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "REPLACE INTO cache (k, v, ts) VALUES (?1, ?2, ?3)",
            params![key, payload.to_string(), now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_ttl() {
        let cache = FxCache::open(Path::new(":memory:")).unwrap();
        cache.put("fx:USD_EUR", &serde_json::json!({"rate": 0.92})).unwrap();
        let got = cache.get("fx:USD_EUR", 60).unwrap();
        assert_eq!(got["rate"], 0.92);
    }

    #[test]
    fn expires_past_ttl() {
        let cache = FxCache::open(Path::new(":memory:")).unwrap();
        let stale_payload = serde_json::json!({"rate": 0.9});
        {
            let conn = cache.conn.lock();
            conn.execute(
                "REPLACE INTO cache (k, v, ts) VALUES (?1, ?2, ?3)",
                params!["fx:OLD", stale_payload.to_string(), 0i64],
            )
            .unwrap();
        }
        assert!(cache.get("fx:OLD", 60).is_none());
    }
}
