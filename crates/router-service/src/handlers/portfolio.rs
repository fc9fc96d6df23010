// =============================================================================
// Portfolio/ledger command rendering — ports
// `original_source/services/telegram_router/app/handlers/portfolio.py::PortfolioHandler`
// =============================================================================

use serde_json::Value;

use crate::screens::{self, TxRow};

/// Mutation endpoints (`/add`, `/remove`, `/cash_remove`, ...) nest the
/// snapshot under `data.portfolio`; the read-only `/portfolio` GET returns it
/// as `data` directly. Accepting either keeps one renderer for both shapes.
pub fn render_portfolio_snapshot(data: &Value) -> Vec<String> {
    let data = data.get("portfolio").unwrap_or(data);
    let total = data.get("total_value_eur").and_then(|v| v.as_str()).map(|s| s.to_string()).unwrap_or_else(|| "0.00".to_string());
    let cash = data.get("cash_eur").and_then(|v| v.as_str()).map(|s| s.to_string()).unwrap_or_else(|| "0.00".to_string());
    let holdings: Vec<(String, String, String)> = data
        .get("holdings")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .map(|h| {
                    let symbol = h.get("display_name").and_then(|v| v.as_str()).or_else(|| h.get("symbol").and_then(|v| v.as_str())).unwrap_or("").to_string();
                    let qty = h.get("qty_total").and_then(|v| v.as_str()).map(|s| s.to_string()).unwrap_or_default();
                    let value = h.get("value_eur").and_then(|v| v.as_str()).map(|s| format!("€{s}")).unwrap_or_default();
                    (symbol, qty, value)
                })
                .collect()
        })
        .unwrap_or_default();
    screens::portfolio_snapshot(&format!("€{total}"), &format!("€{cash}"), &holdings)
}

pub fn render_add(symbol: &str, qty: &str, data: &Value) -> Vec<String> {
    let mut pages = screens::add_success(&symbol.to_ascii_uppercase(), qty);
    pages.extend(render_portfolio_snapshot(data));
    pages
}

pub fn render_remove(symbol: &str, data: &Value) -> Vec<String> {
    let mut pages = screens::remove_success(&symbol.to_ascii_uppercase());
    pages.extend(render_portfolio_snapshot(data));
    pages
}

pub fn render_remove_confirm(symbol: &str) -> Vec<String> {
    screens::remove_confirm(&symbol.to_ascii_uppercase())
}

pub fn render_remove_cancelled(symbol: &str) -> Vec<String> {
    screens::remove_cancelled(&symbol.to_ascii_uppercase())
}

pub fn render_remove_not_owned(symbol: &str) -> Vec<String> {
    screens::remove_not_owned(&symbol.to_ascii_uppercase())
}

pub fn render_cash_add(amount_display: &str) -> Vec<String> {
    screens::cash_add_success(amount_display)
}

pub fn render_cash_remove_confirm(amount_display: &str) -> Vec<String> {
    screens::cash_remove_confirm(amount_display)
}

pub fn render_cash_remove_cancelled(amount_display: &str) -> Vec<String> {
    screens::cash_remove_cancelled(amount_display)
}

pub fn render_cash_remove(amount_display: &str, data: &Value) -> Vec<String> {
    let mut pages = screens::cash_remove_success(amount_display);
    pages.extend(render_portfolio_snapshot(data));
    pages
}

pub fn render_cash(data: &Value) -> Vec<String> {
    let cash = data.get("cash_eur").and_then(|v| v.as_str()).unwrap_or("0.00");
    if cash == "0.00" {
        return screens::cash_zero();
    }
    screens::cash_result(&format!("€{cash}"))
}

pub fn render_transactions(data: &Value) -> Vec<String> {
    let transactions = data.get("transactions").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    if transactions.is_empty() {
        return screens::tx_empty();
    }
    let rows: Vec<TxRow> = transactions
        .iter()
        .map(|tx| {
            let ts_raw = tx.get("ts").and_then(|v| v.as_str()).unwrap_or("");
            let ts = ts_raw.replacen('T', " ", 1).chars().take(16).collect::<String>();
            TxRow {
                ts,
                kind: tx.get("type").and_then(|v| v.as_str()).unwrap_or("").to_ascii_uppercase(),
                symbol: tx.get("symbol").and_then(|v| v.as_str()).unwrap_or("CASH").to_string(),
                qty: tx.get("qty").and_then(|v| v.as_str()).map(|s| s.to_string()).unwrap_or_default(),
                amount: tx.get("amount_eur").and_then(|v| v.as_str()).map(|s| format!("€{s}")).unwrap_or_default(),
            }
        })
        .collect();
    let total = transactions.len();
    let summary = format!("Showing {total} transaction{}", if total != 1 { "s" } else { "" });
    screens::tx_result(&summary, &rows)
}

fn pct_rows(section: &Value) -> Vec<(String, String)> {
    ["stock_pct", "etf_pct", "crypto_pct"]
        .iter()
        .map(|k| {
            let v = section.get(*k).and_then(|v| v.as_i64()).unwrap_or(0);
            (k.trim_end_matches("_pct").to_string(), format!("{v}%"))
        })
        .collect()
}

pub fn render_allocation(data: &Value) -> Vec<String> {
    let current = data.get("current").cloned().unwrap_or(Value::Null);
    let target = data.get("target").cloned().unwrap_or(Value::Null);
    screens::allocation_table(&pct_rows(&current), &pct_rows(&target))
}

pub fn render_allocation_edit_prompt(target: &Value, ttl_min: i64) -> Vec<String> {
    let get = |k: &str| target.get(k).and_then(|v| v.as_i64()).unwrap_or(0);
    screens::allocation_edit_prompt(get("stock_pct"), get("etf_pct"), get("crypto_pct"), ttl_min)
}

pub fn render_allocation_edit_success(data: &Value, fallback_stock: i64, fallback_etf: i64, fallback_crypto: i64) -> Vec<String> {
    let target = data.get("target").cloned().unwrap_or(Value::Null);
    let get = |k: &str, fallback: i64| target.get(k).and_then(|v| v.as_i64()).unwrap_or(fallback);
    screens::allocation_edit_success(get("stock_pct", fallback_stock), get("etf_pct", fallback_etf), get("crypto_pct", fallback_crypto))
}

pub fn render_rename(symbol: &str, nickname: &str) -> Vec<String> {
    screens::rename_success(&symbol.to_ascii_uppercase(), nickname.trim())
}

/// Thin analytics placeholder per spec's Open Question (i): compose what's
/// available, otherwise fall back to the bare `partial:true` screen.
pub fn render_analytics_placeholder(label: &str) -> Vec<String> {
    screens::partial_placeholder(label)
}
