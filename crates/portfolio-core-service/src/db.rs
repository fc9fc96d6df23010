// =============================================================================
// Ledger schema and repository — ports
// `original_source/services/portfolio_core/app/db.py` and `repositories.py`
// =============================================================================
//
// One `rusqlite::Connection` behind a `parking_lot::Mutex`, same simplicity
// trade-off made in fx-service and market-data-service: this ledger's write
// volume is one chat command at a time, so a blocking connection guarded by a
// mutex is simpler than a pool or an async driver and never becomes a
// bottleneck. Per-user mutation serialization (spec's concurrency model) is
// handled one layer up in `AppState`, not here.
//
// `alerts` exists in the original schema but no caller in `services.py`
// reads or writes it, so it is left out here rather than carried as dead
// weight.
// =============================================================================

use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use portfolio_common::timez;
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

pub struct Db {
    conn: Mutex<rusqlite::Connection>,
}

const SCHEMA: &str = "
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS users(
  user_id INTEGER PRIMARY KEY,
  first_name TEXT, last_name TEXT, username TEXT, language_code TEXT,
  created_at TEXT, updated_at TEXT, last_seen_ts TEXT
);
CREATE TABLE IF NOT EXISTS positions(
  user_id INTEGER NOT NULL,
  symbol TEXT NOT NULL,
  asset_class TEXT NOT NULL,
  market TEXT NOT NULL,
  qty TEXT NOT NULL,
  avg_cost_eur TEXT NOT NULL,
  avg_cost_ccy TEXT NOT NULL,
  ccy TEXT NOT NULL,
  display_name TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  PRIMARY KEY(user_id, symbol)
);
CREATE TABLE IF NOT EXISTS cash_balances(
  user_id INTEGER PRIMARY KEY,
  amount_eur TEXT NOT NULL DEFAULT '0',
  updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS transactions(
  tx_id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  op_id TEXT,
  ts TEXT NOT NULL,
  type TEXT NOT NULL,
  symbol TEXT,
  asset_class TEXT,
  qty TEXT,
  price_eur TEXT,
  amount_eur TEXT,
  cash_delta_eur TEXT,
  fees_eur TEXT NOT NULL DEFAULT '0',
  note TEXT
);
CREATE INDEX IF NOT EXISTS idx_transactions_user_ts ON transactions(user_id, ts);
CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_op ON transactions(user_id, op_id) WHERE op_id IS NOT NULL;
CREATE TABLE IF NOT EXISTS operations(
  user_id INTEGER NOT NULL,
  op_id TEXT NOT NULL,
  command TEXT NOT NULL,
  result_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  PRIMARY KEY(user_id, op_id)
);
CREATE TABLE IF NOT EXISTS allocations(
  user_id INTEGER PRIMARY KEY,
  stock_pct INTEGER NOT NULL,
  etf_pct INTEGER NOT NULL,
  crypto_pct INTEGER NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS snapshots(
  user_id INTEGER NOT NULL,
  date TEXT NOT NULL,
  value_eur TEXT NOT NULL,
  net_external_flows_eur TEXT NOT NULL DEFAULT '0',
  daily_r_t TEXT,
  PRIMARY KEY(user_id, date)
);
";

#[derive(Debug, Clone)]
pub struct PositionRow {
    pub symbol: String,
    pub asset_class: String,
    pub market: String,
    pub qty: Decimal,
    pub avg_cost_eur: Decimal,
    pub avg_cost_ccy: Decimal,
    pub ccy: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub tx_id: i64,
    pub ts: String,
    pub tx_type: String,
    pub symbol: Option<String>,
    pub asset_class: Option<String>,
    pub qty: Option<Decimal>,
    pub price_eur: Option<Decimal>,
    pub amount_eur: Option<Decimal>,
    pub cash_delta_eur: Option<Decimal>,
    pub fees_eur: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct AllocationRow {
    pub stock_pct: i64,
    pub etf_pct: i64,
    pub crypto_pct: i64,
}

#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub date: String,
    pub value_eur: Decimal,
    pub net_external_flows_eur: Decimal,
    pub daily_r_t: Option<Decimal>,
}

fn dec(s: String) -> Decimal {
    s.parse().unwrap_or(Decimal::ZERO)
}

fn opt_dec(s: Option<String>) -> Option<Decimal> {
    s.and_then(|v| v.parse().ok())
}

impl Db {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn upsert_user(&self, user_id: i64, first_name: Option<&str>, last_name: &str, username: Option<&str>, language_code: Option<&str>) {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO users(user_id, first_name, last_name, username, language_code, created_at, updated_at, last_seen_ts)
             VALUES(?1,?2,?3,?4,?5,?6,?6,?6)
             ON CONFLICT(user_id) DO UPDATE SET
               first_name=COALESCE(excluded.first_name, users.first_name),
               last_name=excluded.last_name,
               username=COALESCE(excluded.username, users.username),
               language_code=COALESCE(excluded.language_code, users.language_code),
               updated_at=excluded.updated_at, last_seen_ts=excluded.last_seen_ts",
            params![user_id, first_name, last_name, username, language_code, now],
        );
    }

    /// Ensures a cash row and an allocation row exist for `user_id`, seeding
    /// the allocation with the configured default targets. Mirrors
    /// `db.py::ensure_user_state`.
    pub fn ensure_user_state(&self, user_id: i64, default_stock_pct: i64, default_etf_pct: i64, default_crypto_pct: i64) {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO cash_balances(user_id, amount_eur, updated_at) VALUES(?1, '0', ?2)
             ON CONFLICT(user_id) DO NOTHING",
            params![user_id, now],
        );
        let _ = conn.execute(
            "INSERT INTO allocations(user_id, stock_pct, etf_pct, crypto_pct, updated_at) VALUES(?1,?2,?3,?4,?5)
             ON CONFLICT(user_id) DO NOTHING",
            params![user_id, default_stock_pct, default_etf_pct, default_crypto_pct, now],
        );
    }

    pub fn list_positions(&self, user_id: i64) -> Vec<PositionRow> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT symbol, asset_class, market, qty, avg_cost_eur, avg_cost_ccy, ccy, display_name FROM positions WHERE user_id = ?1 ORDER BY symbol")
            .unwrap();
        let rows = stmt
            .query_map(params![user_id], |r| {
                Ok(PositionRow {
                    symbol: r.get(0)?,
                    asset_class: r.get(1)?,
                    market: r.get(2)?,
                    qty: dec(r.get(3)?),
                    avg_cost_eur: dec(r.get(4)?),
                    avg_cost_ccy: dec(r.get(5)?),
                    ccy: r.get(6)?,
                    display_name: r.get(7)?,
                })
            })
            .unwrap();
        rows.filter_map(Result::ok).collect()
    }

    pub fn get_position(&self, user_id: i64, symbol: &str) -> Option<PositionRow> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT symbol, asset_class, market, qty, avg_cost_eur, avg_cost_ccy, ccy, display_name FROM positions WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, symbol],
            |r| {
                Ok(PositionRow {
                    symbol: r.get(0)?,
                    asset_class: r.get(1)?,
                    market: r.get(2)?,
                    qty: dec(r.get(3)?),
                    avg_cost_eur: dec(r.get(4)?),
                    avg_cost_ccy: dec(r.get(5)?),
                    ccy: r.get(6)?,
                    display_name: r.get(7)?,
                })
            },
        )
        .optional()
        .unwrap_or(None)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn upsert_position(
        &self,
        user_id: i64,
        symbol: &str,
        asset_class: &str,
        market: &str,
        qty: Decimal,
        avg_cost_eur: Decimal,
        avg_cost_ccy: Decimal,
        ccy: &str,
        display_name: Option<&str>,
    ) {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO positions(user_id, symbol, asset_class, market, qty, avg_cost_eur, avg_cost_ccy, ccy, display_name, created_at, updated_at)
             VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?10)
             ON CONFLICT(user_id, symbol) DO UPDATE SET
               asset_class=excluded.asset_class, market=excluded.market,
               qty=excluded.qty, avg_cost_eur=excluded.avg_cost_eur, avg_cost_ccy=excluded.avg_cost_ccy,
               ccy=excluded.ccy,
               display_name=COALESCE(excluded.display_name, positions.display_name),
               updated_at=excluded.updated_at",
            params![
                user_id,
                symbol,
                asset_class,
                market,
                qty.to_string(),
                avg_cost_eur.to_string(),
                avg_cost_ccy.to_string(),
                ccy,
                display_name,
                now
            ],
        );
    }

    pub fn delete_position(&self, user_id: i64, symbol: &str) {
        let conn = self.conn.lock();
        let _ = conn.execute("DELETE FROM positions WHERE user_id = ?1 AND symbol = ?2", params![user_id, symbol]);
    }

    pub fn get_cash(&self, user_id: i64) -> Decimal {
        let conn = self.conn.lock();
        conn.query_row("SELECT amount_eur FROM cash_balances WHERE user_id = ?1", params![user_id], |r| r.get::<_, String>(0))
            .optional()
            .unwrap_or(None)
            .map(dec)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn set_cash(&self, user_id: i64, amount_eur: Decimal) {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO cash_balances(user_id, amount_eur, updated_at) VALUES(?1,?2,?3)
             ON CONFLICT(user_id) DO UPDATE SET amount_eur=excluded.amount_eur, updated_at=excluded.updated_at",
            params![user_id, amount_eur.to_string(), now],
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_transaction(
        &self,
        user_id: i64,
        op_id: Option<&str>,
        tx_type: &str,
        symbol: Option<&str>,
        asset_class: Option<&str>,
        qty: Option<Decimal>,
        price_eur: Option<Decimal>,
        amount_eur: Option<Decimal>,
        cash_delta_eur: Option<Decimal>,
        fees_eur: Decimal,
        note: Option<&str>,
    ) -> i64 {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO transactions(user_id, op_id, ts, type, symbol, asset_class, qty, price_eur, amount_eur, cash_delta_eur, fees_eur, note)
             VALUES(?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                user_id,
                op_id,
                now,
                tx_type,
                symbol,
                asset_class,
                qty.map(|v| v.to_string()),
                price_eur.map(|v| v.to_string()),
                amount_eur.map(|v| v.to_string()),
                cash_delta_eur.map(|v| v.to_string()),
                fees_eur.to_string(),
                note
            ],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn list_transactions(&self, user_id: i64, limit: i64) -> Vec<TransactionRow> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT tx_id, ts, type, symbol, asset_class, qty, price_eur, amount_eur, cash_delta_eur, fees_eur
                 FROM transactions WHERE user_id = ?1 ORDER BY datetime(ts) DESC, tx_id DESC LIMIT ?2",
            )
            .unwrap();
        let rows = stmt
            .query_map(params![user_id, limit], |r| {
                Ok(TransactionRow {
                    tx_id: r.get(0)?,
                    ts: r.get(1)?,
                    tx_type: r.get(2)?,
                    symbol: r.get(3)?,
                    asset_class: r.get(4)?,
                    qty: opt_dec(r.get(5)?),
                    price_eur: opt_dec(r.get(6)?),
                    amount_eur: opt_dec(r.get(7)?),
                    cash_delta_eur: opt_dec(r.get(8)?),
                    fees_eur: dec(r.get(9)?),
                })
            })
            .unwrap();
        rows.filter_map(Result::ok).collect()
    }

    pub fn get_allocation(&self, user_id: i64) -> AllocationRow {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT stock_pct, etf_pct, crypto_pct FROM allocations WHERE user_id = ?1",
            params![user_id],
            |r| Ok(AllocationRow { stock_pct: r.get(0)?, etf_pct: r.get(1)?, crypto_pct: r.get(2)? }),
        )
        .optional()
        .unwrap_or(None)
        .unwrap_or(AllocationRow { stock_pct: 0, etf_pct: 0, crypto_pct: 0 })
    }

    pub fn set_allocation(&self, user_id: i64, stock_pct: i64, etf_pct: i64, crypto_pct: i64) {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO allocations(user_id, stock_pct, etf_pct, crypto_pct, updated_at) VALUES(?1,?2,?3,?4,?5)
             ON CONFLICT(user_id) DO UPDATE SET stock_pct=excluded.stock_pct, etf_pct=excluded.etf_pct, crypto_pct=excluded.crypto_pct, updated_at=excluded.updated_at",
            params![user_id, stock_pct, etf_pct, crypto_pct, now],
        );
    }

    pub fn upsert_snapshot(&self, user_id: i64, date: &str, value_eur: Decimal, net_external_flows_eur: Decimal, daily_r_t: Option<Decimal>) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO snapshots(user_id, date, value_eur, net_external_flows_eur, daily_r_t) VALUES(?1,?2,?3,?4,?5)
             ON CONFLICT(user_id, date) DO UPDATE SET value_eur=excluded.value_eur, net_external_flows_eur=excluded.net_external_flows_eur, daily_r_t=excluded.daily_r_t",
            params![user_id, date, value_eur.to_string(), net_external_flows_eur.to_string(), daily_r_t.map(|v| v.to_string())],
        );
    }

    /// Most recent snapshot strictly before `before_date`, used by
    /// `_record_snapshot` to locate the prior value for the TWR calc.
    pub fn last_snapshot_before(&self, user_id: i64, before_date: &str) -> Option<SnapshotRow> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT date, value_eur, net_external_flows_eur, daily_r_t FROM snapshots
             WHERE user_id = ?1 AND date < ?2 ORDER BY date DESC LIMIT 1",
            params![user_id, before_date],
            |r| {
                Ok(SnapshotRow {
                    date: r.get(0)?,
                    value_eur: dec(r.get(1)?),
                    net_external_flows_eur: dec(r.get(2)?),
                    daily_r_t: opt_dec(r.get(3)?),
                })
            },
        )
        .optional()
        .unwrap_or(None)
    }

    pub fn list_snapshots(&self, user_id: i64, start_date: Option<&str>, end_date: Option<&str>) -> Vec<SnapshotRow> {
        let conn = self.conn.lock();
        let mut sql = "SELECT date, value_eur, net_external_flows_eur, daily_r_t FROM snapshots WHERE user_id = ?1".to_string();
        if start_date.is_some() {
            sql.push_str(" AND date >= ?2");
        }
        if end_date.is_some() {
            sql.push_str(if start_date.is_some() { " AND date <= ?3" } else { " AND date <= ?2" });
        }
        sql.push_str(" ORDER BY date ASC");

        let mut stmt = conn.prepare(&sql).unwrap();
        let mapper = |r: &rusqlite::Row| {
            Ok(SnapshotRow {
                date: r.get(0)?,
                value_eur: dec(r.get(1)?),
                net_external_flows_eur: dec(r.get(2)?),
                daily_r_t: opt_dec(r.get(3)?),
            })
        };
        let rows: Vec<SnapshotRow> = match (start_date, end_date) {
            (Some(s), Some(e)) => stmt.query_map(params![user_id, s, e], mapper).unwrap().filter_map(Result::ok).collect(),
            (Some(s), None) => stmt.query_map(params![user_id, s], mapper).unwrap().filter_map(Result::ok).collect(),
            (None, Some(e)) => stmt.query_map(params![user_id, e], mapper).unwrap().filter_map(Result::ok).collect(),
            (None, None) => stmt.query_map(params![user_id], mapper).unwrap().filter_map(Result::ok).collect(),
        };
        rows
    }

    /// Idempotency read: a previously recorded result for `(user_id, op_id)`.
    pub fn get_operation(&self, user_id: i64, op_id: &str) -> Option<serde_json::Value> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT result_json FROM operations WHERE user_id = ?1 AND op_id = ?2",
            params![user_id, op_id],
            |r| r.get::<_, String>(0),
        )
        .optional()
        .unwrap_or(None)
        .and_then(|s| serde_json::from_str(&s).ok())
    }

    pub fn record_operation(&self, user_id: i64, op_id: &str, command: &str, result: &serde_json::Value) {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO operations(user_id, op_id, command, result_json, created_at) VALUES(?1,?2,?3,?4,?5)
             ON CONFLICT(user_id, op_id) DO NOTHING",
            params![user_id, op_id, command, result.to_string(), now],
        );
    }

    /// Deletes snapshot rows older than `days_to_keep`, used by the
    /// `/admin/snapshots/cleanup` endpoint (`scripts/snapshot_cron.py`).
    pub fn cleanup_snapshots(&self, days_to_keep: i64) -> i64 {
        let conn = self.conn.lock();
        // Snapshot dates are keyed on the Berlin calendar day (see
        // `service::record_snapshot`); the cutoff must use the same calendar
        // or the retention window drifts by a day near midnight.
        let cutoff = (timez::now_berlin() - chrono::Duration::days(days_to_keep)).date_naive().to_string();
        conn.execute("DELETE FROM snapshots WHERE date < ?1", params![cutoff]).unwrap_or(0) as i64
    }

    pub fn list_user_ids(&self) -> Vec<i64> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT user_id FROM users ORDER BY user_id").unwrap();
        let rows = stmt.query_map([], |r| r.get(0)).unwrap();
        rows.filter_map(Result::ok).collect()
    }

    pub fn count_users(&self) -> i64 {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec as decmac;

    #[test]
    fn position_round_trips() {
        let db = Db::open(Path::new(":memory:")).unwrap();
        db.upsert_position(1, "AAPL.US", "stock", "US", decmac!(10), decmac!(150.00), decmac!(165.00), "USD", Some("Apple"));
        let p = db.get_position(1, "AAPL.US").unwrap();
        assert_eq!(p.qty, decmac!(10));
        assert_eq!(p.display_name.as_deref(), Some("Apple"));
    }

    #[test]
    fn cash_round_trips() {
        let db = Db::open(Path::new(":memory:")).unwrap();
        assert_eq!(db.get_cash(1), Decimal::ZERO);
        db.set_cash(1, decmac!(500));
        assert_eq!(db.get_cash(1), decmac!(500));
    }

    #[test]
    fn idempotency_replay() {
        let db = Db::open(Path::new(":memory:")).unwrap();
        assert!(db.get_operation(1, "op-1").is_none());
        db.record_operation(1, "op-1", "buy", &serde_json::json!({"ok": true}));
        assert_eq!(db.get_operation(1, "op-1").unwrap()["ok"], true);
    }

    #[test]
    fn last_snapshot_before_finds_prior_day() {
        let db = Db::open(Path::new(":memory:")).unwrap();
        db.upsert_snapshot(1, "2026-07-25", decmac!(1000), Decimal::ZERO, None);
        db.upsert_snapshot(1, "2026-07-26", decmac!(1010), Decimal::ZERO, Some(decmac!(0.01)));
        let prev = db.last_snapshot_before(1, "2026-07-27").unwrap();
        assert_eq!(prev.date, "2026-07-26");
        assert_eq!(prev.value_eur, decmac!(1010));
    }
}
