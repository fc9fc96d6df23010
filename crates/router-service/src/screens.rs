// =============================================================================
// Reply page rendering — ports the shape of
// `original_source/services/telegram_router/app/ui/loader.py::render_screen`
// =============================================================================
//
// spec.md §1 puts the UI template engine (the `registry.json`-adjacent
// screen-templates file, MarkdownV2 escaping, pagination) out of scope; this
// module keeps only its load-bearing contract — one function per screen that
// returns plain-text reply pages — as a set of small Rust formatting
// functions rather than a YAML/JSON-driven template loader.
// =============================================================================

use rust_decimal::Decimal;

pub fn euro(value: Decimal) -> String {
    format!("€{:.2}", value)
}

pub fn quantity(value: Decimal) -> String {
    let s = value.normalize().to_string();
    if s.is_empty() {
        "0".to_string()
    } else {
        s
    }
}

pub fn signed_percent(pct: Option<f64>) -> String {
    match pct {
        Some(p) => format!("{p:+.1}%"),
        None => "n/a".to_string(),
    }
}

/// Precision-4 float display with trailing zeroes stripped, per the `/fx`
/// rate-rendering rule in spec §4.5.
pub fn strip_trailing_zeros_4dp(value: f64) -> String {
    portfolio_common::money::strip_trailing_zeros(&format!("{value:.4}"))
}

pub fn not_authorized() -> Vec<String> {
    vec!["You are not authorized to use this bot.".to_string()]
}

pub fn unknown_input() -> Vec<String> {
    vec!["I didn't understand that. Send /help to see available commands.".to_string()]
}

pub fn unknown_command(cmd: &str) -> Vec<String> {
    vec![format!("Unknown command {cmd}. Send /help to see available commands.")]
}

pub fn invalid_template(error: &str, usage: &str, example: &str) -> Vec<String> {
    let mut lines = vec![format!("Invalid input: {error}")];
    if !usage.is_empty() {
        lines.push(format!("Usage: {usage}"));
    }
    if !example.is_empty() {
        lines.push(format!("Example: {example}"));
    }
    vec![lines.join("\n")]
}

pub fn service_error(message: &str, usage: &str, example: &str) -> Vec<String> {
    let mut lines = vec![message.to_string()];
    if !usage.is_empty() {
        lines.push(format!("Usage: {usage}"));
    }
    if !example.is_empty() {
        lines.push(format!("Example: {example}"));
    }
    vec![lines.join("\n")]
}

pub fn generic_prompt(usage: &str, ttl_min: i64) -> Vec<String> {
    vec![format!("{usage}\nSession ends after {ttl_min} min of inactivity.")]
}

pub fn help_lines(commands: &[(String, String)]) -> Vec<String> {
    let mut out = vec!["Available commands:".to_string()];
    for (usage, description) in commands {
        if usage.is_empty() {
            continue;
        }
        out.push(format!("{usage} — {description}"));
    }
    vec![out.join("\n")]
}

pub fn canceled() -> Vec<String> {
    vec!["Cancelled.".to_string()]
}

pub fn price_prompt(ttl_min: i64) -> Vec<String> {
    vec![format!("Send one or more tickers, e.g. `aapl sap.xetra`.\nSession ends after {ttl_min} min of inactivity.")]
}

pub fn price_not_found(symbols: &[String], ttl_min: i64) -> Vec<String> {
    vec![format!(
        "Couldn't find: {}.\nTry another ticker.\nSession ends after {ttl_min} min of inactivity.",
        symbols.join(", ")
    )]
}

pub struct PriceRow {
    pub symbol: String,
    pub now_eur: Option<String>,
    pub open_eur: Option<String>,
    pub pct: Option<f64>,
    pub market: String,
    pub freshness: String,
}

pub fn price_result(rows: &[PriceRow], missing: &[String]) -> Vec<String> {
    let mut out = vec!["TICKER   NOW       OPEN      %       MARKET  FRESHNESS".to_string()];
    for r in rows {
        out.push(format!(
            "{:<8} {:<9} {:<9} {:<7} {:<7} {}",
            r.symbol,
            r.now_eur.clone().unwrap_or_else(|| "n/a".to_string()),
            r.open_eur.clone().unwrap_or_else(|| "n/a".to_string()),
            signed_percent(r.pct),
            r.market,
            r.freshness,
        ));
    }
    let mut text = out.join("\n");
    if !missing.is_empty() {
        text.push_str(&format!("\n\nTickers couldn't be found: {}", missing.join(", ")));
    }
    vec![text]
}

pub fn fx_prompt(ttl_min: i64) -> Vec<String> {
    vec![format!("Send `/fx BASE QUOTE`, e.g. `/fx eur usd`.\nSession ends after {ttl_min} min of inactivity.")]
}

pub fn fx_result(base: &str, quote: &str, rate: &str) -> Vec<String> {
    vec![format!("1 {base} = {rate} {quote}")]
}

pub fn fx_error(base: &str, quote: &str, usage: &str, example: &str) -> Vec<String> {
    vec![format!("Couldn't fetch rate for {base}/{quote}.\nUsage: {usage}\nExample: {example}")]
}

pub fn buy_success(symbol: &str, qty: &str, price_display: &str) -> Vec<String> {
    vec![format!("Bought {qty} {symbol} @ {price_display}.")]
}

pub fn sell_success(symbol: &str, qty: &str, price_display: &str) -> Vec<String> {
    vec![format!("Sold {qty} {symbol} @ {price_display}.")]
}

pub fn add_success(symbol: &str, qty: &str) -> Vec<String> {
    vec![format!("Added {qty} {symbol}.")]
}

pub fn remove_confirm(symbol: &str) -> Vec<String> {
    vec![format!("Remove {symbol} entirely? Reply Y or N.")]
}

pub fn remove_cancelled(symbol: &str) -> Vec<String> {
    vec![format!("Kept {symbol}.")]
}

pub fn remove_success(symbol: &str) -> Vec<String> {
    vec![format!("Removed {symbol}.")]
}

pub fn remove_not_owned(symbol: &str) -> Vec<String> {
    vec![format!("You don't hold {symbol}.")]
}

pub fn cash_add_success(amount_display: &str) -> Vec<String> {
    vec![format!("Deposited {amount_display}.")]
}

pub fn cash_remove_confirm(amount_display: &str) -> Vec<String> {
    vec![format!("Withdraw {amount_display}? Reply Y or N.")]
}

pub fn cash_remove_cancelled(amount_display: &str) -> Vec<String> {
    vec![format!("Kept {amount_display} in cash.")]
}

pub fn cash_remove_success(amount_display: &str) -> Vec<String> {
    vec![format!("Withdrew {amount_display}.")]
}

pub fn cash_zero() -> Vec<String> {
    vec!["Cash balance: €0.00.".to_string()]
}

pub fn cash_result(balance: &str) -> Vec<String> {
    vec![format!("Cash balance: {balance}.")]
}

pub fn tx_empty() -> Vec<String> {
    vec!["No transactions yet.".to_string()]
}

pub struct TxRow {
    pub ts: String,
    pub kind: String,
    pub symbol: String,
    pub qty: String,
    pub amount: String,
}

pub fn tx_result(summary: &str, rows: &[TxRow]) -> Vec<String> {
    let mut out = vec![summary.to_string(), "DATE             TYPE    SYMBOL   QTY       AMOUNT".to_string()];
    for r in rows {
        out.push(format!("{:<16} {:<7} {:<8} {:<9} {}", r.ts, r.kind, r.symbol, r.qty, r.amount));
    }
    vec![out.join("\n")]
}

pub fn allocation_table(current: &[(String, String)], target: &[(String, String)]) -> Vec<String> {
    let mut lines = vec!["Allocation (current vs target):".to_string()];
    for ((cname, cval), (_, tval)) in current.iter().zip(target.iter()) {
        lines.push(format!("{cname}: {cval} (target {tval})"));
    }
    vec![lines.join("\n")]
}

pub fn allocation_edit_prompt(stock: i64, etf: i64, crypto: i64, ttl_min: i64) -> Vec<String> {
    vec![format!(
        "Current targets — stock {stock}%, etf {etf}%, crypto {crypto}%.\nSend new STOCK% ETF% CRYPTO% (must sum to 100).\nSession ends after {ttl_min} min of inactivity."
    )]
}

pub fn allocation_edit_success(stock: i64, etf: i64, crypto: i64) -> Vec<String> {
    vec![format!("New targets — stock {stock}%, etf {etf}%, crypto {crypto}%.")]
}

pub fn rename_success(symbol: &str, nickname: &str) -> Vec<String> {
    vec![format!("{symbol} is now labeled \"{nickname}\".")]
}

pub fn portfolio_snapshot(total_value_eur: &str, cash_eur: &str, holdings: &[(String, String, String)]) -> Vec<String> {
    let mut lines = vec![format!("Portfolio value: {total_value_eur} (cash {cash_eur})")];
    for (symbol, qty, value) in holdings {
        lines.push(format!("{symbol}: {qty} = {value}"));
    }
    vec![lines.join("\n")]
}

pub fn partial_placeholder(label: &str) -> Vec<String> {
    vec![format!("{label}: data is partially available; benchmark comparison is best-effort.")]
}
