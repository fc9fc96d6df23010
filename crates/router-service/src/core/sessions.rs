// =============================================================================
// Per-chat conversational session store — ports
// `original_source/services/telegram_router/app/core/sessions.py::SessionStore`
// =============================================================================
//
// The original keeps one JSON file per chat under a directory. SPEC_FULL.md
// moves that to sqlite (the same `rusqlite::Connection` behind a
// `parking_lot::Mutex` pattern `portfolio-core-service/src/db.rs` uses for its
// ledger) so the router survives restarts without a directory of loose files
// to garbage-collect, while keeping the same row shape: a JSON blob, a
// timestamp, and a per-row TTL.
// =============================================================================

use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SCHEMA: &str = "
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS sessions(
  chat_id INTEGER PRIMARY KEY,
  data TEXT NOT NULL,
  ts INTEGER NOT NULL,
  ttl_sec INTEGER NOT NULL
);
";

/// A command awaiting its remaining arguments, or a pending Y/N confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub cmd: String,
    #[serde(default)]
    pub got: Map<String, Value>,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default)]
    pub confirm: Option<ConfirmBlock>,
}

impl Default for Session {
    fn default() -> Self {
        Self { cmd: String::new(), got: Map::new(), sticky: false, confirm: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmBlock {
    pub action: String,
    pub payload: Map<String, Value>,
    pub prompt: String,
}

pub struct SessionStore {
    conn: Mutex<rusqlite::Connection>,
    default_ttl_sec: i64,
}

impl SessionStore {
    pub fn open(path: &Path, default_ttl_sec: i64) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn), default_ttl_sec })
    }

    pub fn get(&self, chat_id: i64) -> Option<Session> {
        let conn = self.conn.lock();
        let row: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT data, ts, ttl_sec FROM sessions WHERE chat_id = ?1",
                params![chat_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .ok()
            .flatten();
        let (data, ts, ttl_sec) = row?;
        if Utc::now().timestamp() - ts > ttl_sec {
            let _ = conn.execute("DELETE FROM sessions WHERE chat_id = ?1", params![chat_id]);
            return None;
        }
        serde_json::from_str(&data).ok()
    }

    pub fn set(&self, chat_id: i64, session: &Session) {
        self.set_with_ttl(chat_id, session, self.default_ttl_sec);
    }

    pub fn set_with_ttl(&self, chat_id: i64, session: &Session, ttl_sec: i64) {
        let data = serde_json::to_string(session).unwrap_or_else(|_| "{}".to_string());
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO sessions(chat_id, data, ts, ttl_sec) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_id) DO UPDATE SET data = excluded.data, ts = excluded.ts, ttl_sec = excluded.ttl_sec",
            params![chat_id, data, Utc::now().timestamp(), ttl_sec],
        );
    }

    pub fn clear(&self, chat_id: i64) {
        let conn = self.conn.lock();
        let _ = conn.execute("DELETE FROM sessions WHERE chat_id = ?1", params![chat_id]);
    }
}

/// True iff `existing` is a live sticky session (`/price`, `/fx`) and the
/// freshly-resolved command is switching away from it. A sticky session only
/// ever gets torn down by this explicit "switched commands" check — not by
/// every non-sticky turn, since CONFIRMING and PROMPTING sessions for
/// ordinary commands manage their own lifetime via `clear()`.
pub fn should_clear_session(existing_is_sticky: bool, existing_cmd: &str, new_cmd: &str) -> bool {
    existing_is_sticky && existing_cmd != new_cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_sqlite() {
        let dir = std::env::temp_dir().join(format!("router-session-test-{}", uuid::Uuid::new_v4()));
        let store = SessionStore::open(&dir, 300).unwrap();
        let session = Session { cmd: "/price".to_string(), got: Map::new(), sticky: true, confirm: None };
        store.set(42, &session);
        let fetched = store.get(42).unwrap();
        assert_eq!(fetched.cmd, "/price");
        assert!(fetched.sticky);
        store.clear(42);
        assert!(store.get(42).is_none());
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn expires_past_ttl() {
        let dir = std::env::temp_dir().join(format!("router-session-test-{}", uuid::Uuid::new_v4()));
        let store = SessionStore::open(&dir, -1).unwrap();
        let session = Session { cmd: "/buy".to_string(), got: Map::new(), sticky: false, confirm: None };
        store.set(7, &session);
        assert!(store.get(7).is_none());
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn sticky_session_clears_only_on_command_switch() {
        assert!(!should_clear_session(true, "/price", "/price"));
        assert!(should_clear_session(true, "/price", "/fx"));
        assert!(!should_clear_session(false, "/buy", "/sell"));
    }
}
