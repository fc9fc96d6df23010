// =============================================================================
// Inbound update de-duplication — ports
// `original_source/services/telegram_router/app/core/idempotency.py::IdempotencyStore`
// =============================================================================
//
// The original keeps one JSON file holding, per chat, a capped list of
// already-seen Telegram `update_id`s. Here that becomes a single sqlite table
// keyed by `(chat_id, update_id)` — a straight `INSERT OR IGNORE` gives the
// same "seen before?" check-and-insert atomically, without re-reading and
// re-writing the whole list on every webhook delivery. The `max_per_chat` cap
// is kept as a periodic prune rather than an on-every-call trim, since sqlite
// can answer `seen` with one statement instead of loading the full list first.
// =============================================================================

use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::params;

const SCHEMA: &str = "
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS seen_updates(
  chat_id INTEGER NOT NULL,
  update_id INTEGER NOT NULL,
  ts INTEGER NOT NULL,
  PRIMARY KEY(chat_id, update_id)
);
";

pub struct IdempotencyStore {
    conn: Mutex<rusqlite::Connection>,
    max_per_chat: i64,
}

impl IdempotencyStore {
    pub fn open(path: &Path, max_per_chat: i64) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn), max_per_chat })
    }

    /// Returns `true` if `(chat_id, update_id)` was already recorded (this
    /// delivery is a Telegram-retried duplicate), otherwise records it and
    /// returns `false`.
    pub fn seen(&self, chat_id: i64, update_id: i64) -> bool {
        let conn = self.conn.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO seen_updates(chat_id, update_id, ts) VALUES (?1, ?2, ?3)",
                params![chat_id, update_id, Utc::now().timestamp()],
            )
            .unwrap_or(0);
        if inserted == 0 {
            return true;
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM seen_updates WHERE chat_id = ?1", params![chat_id], |r| r.get(0))
            .unwrap_or(0);
        if count > self.max_per_chat {
            let _ = conn.execute(
                "DELETE FROM seen_updates WHERE chat_id = ?1 AND update_id NOT IN
                 (SELECT update_id FROM seen_updates WHERE chat_id = ?1 ORDER BY ts DESC LIMIT ?2)",
                params![chat_id, self.max_per_chat],
            );
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_not_seen_second_is() {
        let dir = std::env::temp_dir().join(format!("router-idem-test-{}", uuid::Uuid::new_v4()));
        let store = IdempotencyStore::open(&dir, 50).unwrap();
        assert!(!store.seen(1, 100));
        assert!(store.seen(1, 100));
        assert!(!store.seen(1, 101));
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn distinct_chats_track_independently() {
        let dir = std::env::temp_dir().join(format!("router-idem-test-{}", uuid::Uuid::new_v4()));
        let store = IdempotencyStore::open(&dir, 50).unwrap();
        assert!(!store.seen(1, 5));
        assert!(!store.seen(2, 5));
        let _ = std::fs::remove_file(&dir);
    }
}
