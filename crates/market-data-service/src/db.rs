// =============================================================================
// SQLite cache tables — ports `original_source/services/market_data/app/db.py`
// =============================================================================
//
// One table per cache family (`quotes_cache`, `benchmarks_cache`,
// `meta_cache`) plus a `users` upsert table, all keyed the same way the
// original schema does it: `key` primary key, JSON `payload`, an ISO
// timestamp, and a per-row `ttl_sec` so callers can vary TTL by table without
// a schema migration.
// =============================================================================

use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

pub struct Db {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS users(
  user_id INTEGER PRIMARY KEY,
  first_name TEXT, last_name TEXT, username TEXT, language_code TEXT,
  created_at TEXT, updated_at TEXT, last_seen_ts TEXT
);
CREATE TABLE IF NOT EXISTS quotes_cache(
  key TEXT PRIMARY KEY, payload TEXT NOT NULL, ts INTEGER NOT NULL, ttl_sec INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS benchmarks_cache(
  key TEXT PRIMARY KEY, payload TEXT NOT NULL, ts INTEGER NOT NULL, ttl_sec INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS meta_cache(
  key TEXT PRIMARY KEY, payload TEXT NOT NULL, ts INTEGER NOT NULL, ttl_sec INTEGER NOT NULL
);
";

impl Db {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Delete expired rows for `table` (expiry is computed on read, matching
    /// the original's `DELETE ... WHERE (now - ts) > ttl_sec` sweep) and
    /// return the cached payload if still live. `ts` is stored as unix
    /// seconds rather than the original's ISO string for cheap arithmetic.
    pub fn cache_get(&self, table: &str, key: &str) -> Option<String> {
        let conn = self.conn.lock();
        let now = Utc::now().timestamp();
        let sweep = format!("DELETE FROM {table} WHERE (?1 - ts) > ttl_sec");
        let _ = conn.execute(&sweep, params![now]);
        let select = format!("SELECT payload FROM {table} WHERE key = ?1");
        conn.query_row(&select, params![key], |r| r.get(0)).ok()
    }

    pub fn cache_set(&self, table: &str, key: &str, payload: &str, ttl_sec: u64) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        let now = Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO {table}(key, payload, ts, ttl_sec) VALUES(?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET payload=excluded.payload, ts=excluded.ts, ttl_sec=excluded.ttl_sec"
        );
        conn.execute(&sql, params![key, payload, now, ttl_sec as i64])?;
        Ok(())
    }

    pub fn upsert_user(&self, user_id: i64, first_name: Option<&str>, last_name: &str, username: Option<&str>, language_code: Option<&str>) {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO users(user_id, first_name, last_name, username, language_code, created_at, updated_at, last_seen_ts)
             VALUES(?1,?2,?3,?4,?5,?6,?6,?6)
             ON CONFLICT(user_id) DO UPDATE SET
               first_name=excluded.first_name, last_name=excluded.last_name,
               username=excluded.username, language_code=excluded.language_code,
               updated_at=excluded.updated_at, last_seen_ts=excluded.last_seen_ts",
            params![user_id, first_name, last_name, username, language_code, now],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_round_trips() {
        let db = Db::open(Path::new(":memory:")).unwrap();
        db.cache_set("quotes_cache", "quotes:AAPL.US", "{\"quotes\":[]}", 90).unwrap();
        assert_eq!(db.cache_get("quotes_cache", "quotes:AAPL.US").unwrap(), "{\"quotes\":[]}");
    }
}
