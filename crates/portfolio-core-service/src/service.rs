// =============================================================================
// Ledger business logic — ports
// `original_source/services/portfolio_core/app/services.py::PortfolioService`
// =============================================================================

use std::future::Future;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use portfolio_common::money::quantize_eur;
use portfolio_common::symbols::{infer_asset_class, infer_market_currency, normalize_symbol, AssetClass};
use portfolio_common::timez::today_berlin_iso;
use portfolio_common::UserContext;

use crate::app_state::AppState;
use crate::db::PositionRow;
use crate::models::{
    validate_allocation_edit, validate_trade_request, AddPositionRequest, AllocationEditRequest, AllocationSnapshot, BizResult, BusinessError,
    CashBalance, CashMutationRequest, HoldingSnapshot, PortfolioSnapshot, RemovePositionRequest, RenameRequest, TradeRequest, TransactionRecord,
    TxQuery,
};

/// Upserts the user row and seeds default cash/allocation rows, mirroring
/// `services.py::_ensure_user`.
pub fn ensure_user(state: &AppState, user: &UserContext) {
    state.db.upsert_user(user.user_id, user.first_name.as_deref(), &user.last_name, user.username.as_deref(), user.language_code.as_deref());
    state.db.ensure_user_state(user.user_id, state.config.default_stock_target_pct, state.config.default_etf_target_pct, state.config.default_crypto_target_pct);
}

fn normalise_asset_class(provided: Option<&str>, meta_class: Option<&str>) -> String {
    if let Some(p) = provided {
        if let Ok(ac) = AssetClass::from_str(p) {
            return ac.to_string();
        }
    }
    if let Some(m) = meta_class {
        if let Ok(ac) = AssetClass::from_str(m) {
            return ac.to_string();
        }
    }
    "stock".to_string()
}

/// Runs `producer` only if `op_id` hasn't already been recorded for this
/// user; replays the stored result otherwise. Mirrors
/// `services.py::_with_idempotency`: failures are never cached, only the
/// successful `Value` a producer returns.
async fn with_idempotency<F, Fut>(state: &AppState, user_id: i64, op_id: &str, command: &str, producer: F) -> BizResult<Value>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = BizResult<Value>>,
{
    if let Some(cached) = state.db.get_operation(user_id, op_id) {
        return Ok(cached);
    }
    let result = producer().await?;
    state.db.record_operation(user_id, op_id, command, &result);
    Ok(result)
}

fn quote_price_eur(quotes: &std::collections::HashMap<String, Value>, symbol: &str) -> Option<Decimal> {
    quotes.get(symbol).and_then(|q| q.get("price_eur")).and_then(|v| {
        v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_f64().and_then(|f| Decimal::try_from(f).ok()))
    })
}

fn quote_freshness(quotes: &std::collections::HashMap<String, Value>, symbol: &str) -> Option<String> {
    quotes.get(symbol).and_then(|q| q.get("freshness")).and_then(|v| v.as_str()).map(str::to_string)
}

fn position_to_holding(pos: &PositionRow, price_eur: Decimal, freshness: Option<String>) -> HoldingSnapshot {
    HoldingSnapshot {
        symbol: pos.symbol.clone(),
        display_name: pos.display_name.clone(),
        asset_class: pos.asset_class.clone(),
        market: pos.market.clone(),
        qty_total: pos.qty,
        price_eur: quantize_eur(price_eur),
        value_eur: quantize_eur(price_eur * pos.qty),
        currency: pos.ccy.clone(),
        freshness,
    }
}

/// Builds the current ledger snapshot, force-refreshing quotes/meta for
/// every held symbol. Mirrors `services.py::_build_snapshot`: a missing
/// quote falls back to the position's own average cost so a stale symbol
/// still contributes a value rather than vanishing from the total.
pub async fn build_snapshot(state: &AppState, user_id: i64) -> PortfolioSnapshot {
    let positions = state.db.list_positions(user_id);
    let cash = state.db.get_cash(user_id);

    let symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
    let quotes = if symbols.is_empty() { Default::default() } else { state.market.get_quotes(&symbols, true).await };

    let mut holdings = Vec::with_capacity(positions.len());
    let mut total_value = cash;
    for pos in &positions {
        let price_eur = quote_price_eur(&quotes, &pos.symbol).unwrap_or(pos.avg_cost_eur);
        let freshness = quote_freshness(&quotes, &pos.symbol);
        let holding = position_to_holding(pos, price_eur, freshness);
        total_value += holding.value_eur;
        holdings.push(holding);
    }

    PortfolioSnapshot { total_value_eur: quantize_eur(total_value), cash_eur: quantize_eur(cash), holdings }
}

/// Builds today's snapshot, computes the time-weighted daily return against
/// the most recent prior day's snapshot, and persists both. Mirrors
/// `services.py::_record_snapshot`.
pub async fn record_snapshot(state: &AppState, user_id: i64, flows_eur: Decimal) -> PortfolioSnapshot {
    let snapshot = build_snapshot(state, user_id).await;
    let today = today_berlin_iso();

    let daily_return = match state.db.last_snapshot_before(user_id, &today) {
        Some(prev) if prev.value_eur > Decimal::ZERO => Some(((snapshot.total_value_eur - flows_eur) / prev.value_eur) - Decimal::ONE),
        Some(prev) if prev.value_eur == Decimal::ZERO => Some(Decimal::ZERO),
        _ => None,
    };

    state.db.upsert_snapshot(user_id, &today, snapshot.total_value_eur, flows_eur, daily_return);
    snapshot
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

pub async fn portfolio(state: &AppState, user: &UserContext) -> PortfolioSnapshot {
    ensure_user(state, user);
    build_snapshot(state, user.user_id).await
}

pub fn cash_balance(state: &AppState, user: &UserContext) -> CashBalance {
    ensure_user(state, user);
    CashBalance { cash_eur: quantize_eur(state.db.get_cash(user.user_id)) }
}

pub fn transactions(state: &AppState, user: &UserContext, query: &TxQuery) -> Vec<TransactionRecord> {
    ensure_user(state, user);
    state
        .db
        .list_transactions(user.user_id, query.clamped_limit())
        .into_iter()
        .map(|t| TransactionRecord {
            tx_id: t.tx_id,
            ts: t.ts,
            tx_type: t.tx_type,
            symbol: t.symbol,
            asset_class: t.asset_class,
            qty: t.qty,
            price_eur: t.price_eur,
            amount_eur: t.amount_eur,
            cash_delta_eur: t.cash_delta_eur,
            fees_eur: if t.fees_eur != Decimal::ZERO { Some(t.fees_eur) } else { None },
        })
        .collect()
}

pub struct AllocationView {
    pub current: AllocationSnapshot,
    pub target: AllocationSnapshot,
}

/// Current allocation percentages grouped by asset class, against the
/// configured target split. Mirrors `services.py::allocation`.
pub async fn allocation(state: &AppState, user: &UserContext) -> AllocationView {
    ensure_user(state, user);
    let snapshot = build_snapshot(state, user.user_id).await;
    let denom = snapshot.total_value_eur - snapshot.cash_eur;

    let mut by_class: std::collections::HashMap<String, Decimal> = std::collections::HashMap::new();
    for h in &snapshot.holdings {
        *by_class.entry(h.asset_class.clone()).or_insert(Decimal::ZERO) += h.value_eur;
    }

    let pct_for = |class: &str| -> i64 {
        if denom <= Decimal::ZERO {
            return 0;
        }
        let value = by_class.get(class).copied().unwrap_or(Decimal::ZERO);
        let pct = ((value / denom) * Decimal::from(100)).round();
        pct.to_i64().unwrap_or(0)
    };

    let current = AllocationSnapshot { stock_pct: pct_for("stock"), etf_pct: pct_for("etf"), crypto_pct: pct_for("crypto") };
    let t = state.db.get_allocation(user.user_id);
    let target = AllocationSnapshot { stock_pct: t.stock_pct, etf_pct: t.etf_pct, crypto_pct: t.crypto_pct };

    AllocationView { current, target }
}

// ---------------------------------------------------------------------------
// Mutations — each wrapped in `with_idempotency`
// ---------------------------------------------------------------------------

pub async fn add(state: &AppState, user: &UserContext, req: AddPositionRequest) -> BizResult<Value> {
    ensure_user(state, user);
    if req.qty <= Decimal::ZERO {
        return Err(BusinessError::bad_input("qty must be positive"));
    }
    let symbol = normalize_symbol(&req.symbol);
    let user_id = user.user_id;

    let meta = state.market.get_meta(std::slice::from_ref(&symbol)).await;
    let quotes = state.market.get_quotes(std::slice::from_ref(&symbol), true).await;

    let meta_class = meta.get(&symbol).and_then(|m| m.get("asset_class")).and_then(|v| v.as_str());
    let asset_class = normalise_asset_class(req.asset_class.as_deref(), meta_class);
    let (default_market, default_ccy) = infer_market_currency(&symbol);
    let market = meta.get(&symbol).and_then(|m| m.get("market")).and_then(|v| v.as_str()).unwrap_or(default_market).to_string();
    let ccy = meta.get(&symbol).and_then(|m| m.get("currency")).and_then(|v| v.as_str()).unwrap_or(default_ccy).to_string();

    let produced = with_idempotency(state, user_id, &req.op_id, "add", || async {
        let existing = state.db.get_position(user_id, &symbol);
        let (new_qty, avg_cost_eur, avg_cost_ccy) = match &existing {
            Some(p) => (p.qty + req.qty, p.avg_cost_eur, p.avg_cost_ccy),
            None => {
                let price = quote_price_eur(&quotes, &symbol).unwrap_or(Decimal::ZERO);
                (req.qty, price, price)
            }
        };
        state.db.upsert_position(user_id, &symbol, &asset_class, &market, new_qty, avg_cost_eur, avg_cost_ccy, &ccy, None);
        state.db.add_transaction(user_id, Some(&req.op_id), "add", Some(&symbol), Some(&asset_class), Some(req.qty), None, None, Some(Decimal::ZERO), Decimal::ZERO, None);
        let snapshot = record_snapshot(state, user_id, Decimal::ZERO).await;
        Ok(serde_json::json!({ "portfolio": snapshot }))
    })
    .await?;

    Ok(produced)
}

pub async fn remove(state: &AppState, user: &UserContext, req: RemovePositionRequest) -> BizResult<Value> {
    ensure_user(state, user);
    let symbol = normalize_symbol(&req.symbol);
    let user_id = user.user_id;

    if state.db.get_position(user_id, &symbol).is_none() {
        return Err(BusinessError::not_found(format!("no position in {symbol}")));
    }

    with_idempotency(state, user_id, &req.op_id, "remove", || async {
        let pos = state.db.get_position(user_id, &symbol);
        let Some(pos) = pos else {
            return Err(BusinessError::not_found(format!("no position in {symbol}")));
        };
        state.db.delete_position(user_id, &symbol);
        state.db.add_transaction(user_id, Some(&req.op_id), "remove", Some(&symbol), Some(&pos.asset_class), Some(pos.qty), None, None, Some(Decimal::ZERO), Decimal::ZERO, None);
        let snapshot = record_snapshot(state, user_id, Decimal::ZERO).await;
        Ok(serde_json::json!({ "portfolio": snapshot }))
    })
    .await
}

pub async fn cash_add(state: &AppState, user: &UserContext, req: CashMutationRequest) -> BizResult<Value> {
    ensure_user(state, user);
    if req.amount_eur <= Decimal::ZERO {
        return Err(BusinessError::bad_input("amount_eur must be positive"));
    }
    let user_id = user.user_id;

    with_idempotency(state, user_id, &req.op_id, "cash_add", || async {
        let current = state.db.get_cash(user_id);
        let updated = quantize_eur(current + req.amount_eur);
        state.db.set_cash(user_id, updated);
        state.db.add_transaction(user_id, Some(&req.op_id), "cash_add", None, None, None, None, Some(req.amount_eur), Some(req.amount_eur), Decimal::ZERO, None);
        let snapshot = record_snapshot(state, user_id, req.amount_eur).await;
        Ok(serde_json::json!({ "portfolio": snapshot }))
    })
    .await
}

pub async fn cash_remove(state: &AppState, user: &UserContext, req: CashMutationRequest) -> BizResult<Value> {
    ensure_user(state, user);
    if req.amount_eur <= Decimal::ZERO {
        return Err(BusinessError::bad_input("amount_eur must be positive"));
    }
    let user_id = user.user_id;
    let current = state.db.get_cash(user_id);
    if current < req.amount_eur {
        return Err(BusinessError::insufficient("insufficient cash balance").with_details(serde_json::json!({ "current_balance": current })));
    }

    with_idempotency(state, user_id, &req.op_id, "cash_remove", || async {
        let current = state.db.get_cash(user_id);
        if current < req.amount_eur {
            return Err(BusinessError::insufficient("insufficient cash balance").with_details(serde_json::json!({ "current_balance": current })));
        }
        let updated = quantize_eur(current - req.amount_eur);
        state.db.set_cash(user_id, updated);
        let neg_amount = -req.amount_eur;
        state.db.add_transaction(user_id, Some(&req.op_id), "cash_remove", None, None, None, None, Some(req.amount_eur), Some(neg_amount), Decimal::ZERO, None);
        let snapshot = record_snapshot(state, user_id, neg_amount).await;
        Ok(serde_json::json!({ "portfolio": snapshot }))
    })
    .await
}

async fn resolve_trade_price(state: &AppState, symbol: &str, explicit: Option<Decimal>) -> BizResult<Decimal> {
    if let Some(p) = explicit {
        return Ok(p);
    }
    let quotes = state.market.get_quotes(std::slice::from_ref(&symbol.to_string()), true).await;
    quote_price_eur(&quotes, symbol).ok_or_else(|| BusinessError::bad_input("no price available; supply price_eur explicitly"))
}

pub async fn buy(state: &AppState, user: &UserContext, req: TradeRequest) -> BizResult<Value> {
    ensure_user(state, user);
    validate_trade_request(&req)?;
    let symbol = normalize_symbol(&req.symbol);
    let user_id = user.user_id;

    let meta = state.market.get_meta(std::slice::from_ref(&symbol)).await;
    let meta_class = meta.get(&symbol).and_then(|m| m.get("asset_class")).and_then(|v| v.as_str());
    let asset_class = match meta_class.and_then(|m| AssetClass::from_str(m).ok()) {
        Some(ac) => ac.to_string(),
        None => infer_asset_class(&symbol).to_string(),
    };
    let (default_market, default_ccy) = infer_market_currency(&symbol);
    let market = meta.get(&symbol).and_then(|m| m.get("market")).and_then(|v| v.as_str()).unwrap_or(default_market).to_string();
    let ccy = meta.get(&symbol).and_then(|m| m.get("currency")).and_then(|v| v.as_str()).unwrap_or(default_ccy).to_string();

    let price = resolve_trade_price(state, &symbol, req.price_eur).await?;
    let fees = quantize_eur(req.fees_eur.unwrap_or(Decimal::ZERO));
    let amount = quantize_eur(price * req.qty);
    let total_cost = quantize_eur(amount + fees);

    let current_cash = state.db.get_cash(user_id);
    if current_cash < total_cost {
        return Err(BusinessError::insufficient("insufficient cash balance").with_details(serde_json::json!({ "current_balance": current_cash })));
    }

    with_idempotency(state, user_id, &req.op_id, "buy", || async {
        let current_cash = state.db.get_cash(user_id);
        if current_cash < total_cost {
            return Err(BusinessError::insufficient("insufficient cash balance").with_details(serde_json::json!({ "current_balance": current_cash })));
        }
        let existing = state.db.get_position(user_id, &symbol);
        let (old_qty, old_avg) = existing.as_ref().map(|p| (p.qty, p.avg_cost_eur)).unwrap_or((Decimal::ZERO, Decimal::ZERO));
        let new_qty = old_qty + req.qty;
        let new_avg = if new_qty > Decimal::ZERO { ((old_qty * old_avg) + amount) / new_qty } else { price };

        state.db.upsert_position(user_id, &symbol, &asset_class, &market, new_qty, quantize_eur(new_avg), quantize_eur(new_avg), &ccy, None);
        state.db.set_cash(user_id, quantize_eur(current_cash - total_cost));
        let fees_recorded = if fees != Decimal::ZERO { fees } else { Decimal::ZERO };
        state.db.add_transaction(
            user_id,
            Some(&req.op_id),
            "buy",
            Some(&symbol),
            Some(&asset_class),
            Some(req.qty),
            Some(price),
            Some(amount),
            Some(-total_cost),
            fees_recorded,
            None,
        );
        let snapshot = record_snapshot(state, user_id, Decimal::ZERO).await;
        Ok(serde_json::json!({ "portfolio": snapshot }))
    })
    .await
}

pub async fn sell(state: &AppState, user: &UserContext, req: TradeRequest) -> BizResult<Value> {
    ensure_user(state, user);
    validate_trade_request(&req)?;
    let symbol = normalize_symbol(&req.symbol);
    let user_id = user.user_id;

    let Some(existing) = state.db.get_position(user_id, &symbol) else {
        return Err(BusinessError::not_found(format!("no position in {symbol}")));
    };
    if req.qty > existing.qty {
        return Err(BusinessError::insufficient("insufficient quantity held").with_details(serde_json::json!({ "available_qty": existing.qty })));
    }

    let price = resolve_trade_price(state, &symbol, req.price_eur).await?;
    let fees = quantize_eur(req.fees_eur.unwrap_or(Decimal::ZERO));
    let amount = quantize_eur(price * req.qty);
    let net_proceeds = quantize_eur(amount - fees);
    if net_proceeds < Decimal::ZERO {
        return Err(BusinessError::bad_input("fees exceed sale proceeds").with_details(serde_json::json!({ "amount": amount, "fees": fees })));
    }

    with_idempotency(state, user_id, &req.op_id, "sell", || async {
        let Some(pos) = state.db.get_position(user_id, &symbol) else {
            return Err(BusinessError::not_found(format!("no position in {symbol}")));
        };
        if req.qty > pos.qty {
            return Err(BusinessError::insufficient("insufficient quantity held").with_details(serde_json::json!({ "available_qty": pos.qty })));
        }
        let remaining = pos.qty - req.qty;
        if remaining == Decimal::ZERO {
            state.db.delete_position(user_id, &symbol);
        } else {
            state.db.upsert_position(user_id, &symbol, &pos.asset_class, &pos.market, remaining, pos.avg_cost_eur, pos.avg_cost_ccy, &pos.ccy, None);
        }
        let current_cash = state.db.get_cash(user_id);
        state.db.set_cash(user_id, quantize_eur(current_cash + net_proceeds));
        state.db.add_transaction(
            user_id,
            Some(&req.op_id),
            "sell",
            Some(&symbol),
            Some(&pos.asset_class),
            Some(req.qty),
            Some(price),
            Some(amount),
            Some(net_proceeds),
            if fees != Decimal::ZERO { fees } else { Decimal::ZERO },
            None,
        );
        let snapshot = record_snapshot(state, user_id, Decimal::ZERO).await;
        Ok(serde_json::json!({ "portfolio": snapshot }))
    })
    .await
}

pub async fn allocation_edit(state: &AppState, user: &UserContext, req: AllocationEditRequest) -> BizResult<Value> {
    ensure_user(state, user);
    validate_allocation_edit(&req)?;
    let total = req.stock_pct + req.etf_pct + req.crypto_pct;
    if total != 100 {
        return Err(BusinessError::bad_input("allocation percentages must sum to 100").with_details(serde_json::json!({ "total": total })));
    }
    let user_id = user.user_id;

    with_idempotency(state, user_id, &req.op_id, "allocation_edit", || async {
        let before = state.db.get_allocation(user_id);
        state.db.set_allocation(user_id, req.stock_pct, req.etf_pct, req.crypto_pct);
        let view = allocation(state, user).await;
        Ok(serde_json::json!({
            "previous": AllocationSnapshot { stock_pct: before.stock_pct, etf_pct: before.etf_pct, crypto_pct: before.crypto_pct },
            "current": view.current,
            "target": view.target,
        }))
    })
    .await
}

pub async fn rename(state: &AppState, user: &UserContext, req: RenameRequest) -> BizResult<Value> {
    ensure_user(state, user);
    let symbol = normalize_symbol(&req.symbol);
    let user_id = user.user_id;
    let display_name = req.display_name.trim().to_string();

    with_idempotency(state, user_id, &req.op_id, "rename", || async {
        let Some(pos) = state.db.get_position(user_id, &symbol) else {
            return Err(BusinessError::not_found(format!("no position in {symbol}")));
        };
        state.db.upsert_position(user_id, &symbol, &pos.asset_class, &pos.market, pos.qty, pos.avg_cost_eur, pos.avg_cost_ccy, &pos.ccy, Some(&display_name));
        Ok(serde_json::json!({ "rename": { "symbol": symbol, "display_name": display_name } }))
    })
    .await
}

// ---------------------------------------------------------------------------
// Analytics — always `partial: true`, best-effort against the benchmark
// series since a downed market-data service shouldn't block the ledger
// view itself. Mirrors `services.py`'s analytics stubs.
// ---------------------------------------------------------------------------

const ANALYTICS_BENCHMARK_SYMBOLS: [&str; 2] = ["GSPC.INDX", "XAUUSD.FOREX"];

pub async fn portfolio_snapshot(state: &AppState, user: &UserContext, period: &str) -> Value {
    ensure_user(state, user);
    let snapshot = build_snapshot(state, user.user_id).await;
    let benchmarks = state.market.get_benchmarks(&ANALYTICS_BENCHMARK_SYMBOLS.map(String::from), period).await;
    serde_json::json!({ "snapshot": { "portfolio": snapshot, "benchmarks": benchmarks } })
}

pub async fn portfolio_summary(state: &AppState, user: &UserContext, period: &str) -> Value {
    ensure_user(state, user);
    let snapshot = build_snapshot(state, user.user_id).await;
    let snapshots = state.db.list_snapshots(user.user_id, None, None);
    let benchmarks = state.market.get_benchmarks(&ANALYTICS_BENCHMARK_SYMBOLS.map(String::from), period).await;
    serde_json::json!({
        "summary": {
            "portfolio": snapshot,
            "history_points": snapshots.len(),
            "benchmarks": benchmarks,
        }
    })
}

pub async fn portfolio_breakdown(state: &AppState, user: &UserContext, _period: &str) -> Value {
    ensure_user(state, user);
    let view = allocation(state, user).await;
    serde_json::json!({ "breakdown": { "current": view.current, "target": view.target } })
}

pub async fn portfolio_digest(state: &AppState, user: &UserContext, period: &str) -> Value {
    ensure_user(state, user);
    let snapshot = build_snapshot(state, user.user_id).await;
    let benchmarks = state.market.get_benchmarks(&ANALYTICS_BENCHMARK_SYMBOLS.map(String::from), period).await;
    serde_json::json!({ "digest": { "portfolio": snapshot, "benchmarks": benchmarks } })
}

pub async fn portfolio_movers(state: &AppState, user: &UserContext, _period: &str) -> Value {
    ensure_user(state, user);
    let snapshot = build_snapshot(state, user.user_id).await;
    let mut sorted = snapshot.holdings.clone();
    sorted.sort_by(|a, b| b.value_eur.cmp(&a.value_eur));
    serde_json::json!({ "movers": sorted })
}

pub async fn what_if(state: &AppState, user: &UserContext, _symbol: &str, delta_pct: Decimal) -> BizResult<Value> {
    ensure_user(state, user);
    let snapshot = build_snapshot(state, user.user_id).await;
    let impact = quantize_eur(snapshot.total_value_eur * delta_pct / Decimal::from(100));
    Ok(serde_json::json!({
        "what_if": {
            "portfolio": snapshot,
            "delta_pct": delta_pct,
            "delta_eur": impact,
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rust_decimal_macros::dec as decmac;

    use super::*;
    use crate::config::PortfolioConfig;

    fn test_state() -> AppState {
        let config = PortfolioConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: PathBuf::from(":memory:"),
            // Nothing listens here; retries=0 makes every call fail fast
            // instead of hanging, exactly like a downed market-data service.
            market_data_base_url: "http://127.0.0.1:1".to_string(),
            market_data_timeout_secs: 1,
            market_data_retries: 0,
            quotes_cache_ttl_sec: 90,
            meta_cache_ttl_sec: 86_400,
            benchmark_cache_ttl_sec: 900,
            default_stock_target_pct: 60,
            default_etf_target_pct: 30,
            default_crypto_target_pct: 10,
        };
        AppState::new(config).unwrap()
    }

    fn user(id: i64) -> UserContext {
        UserContext { user_id: id, first_name: Some("Test".to_string()), last_name: String::new(), username: None, language_code: None }
    }

    #[tokio::test]
    async fn add_is_idempotent_on_op_id_replay() {
        let state = test_state();
        let u = user(1);
        let req = AddPositionRequest { op_id: "a1".to_string(), symbol: "ETH-USD".to_string(), qty: decmac!(2), asset_class: Some("crypto".to_string()) };
        add(&state, &u, req.clone()).await.unwrap();
        add(&state, &u, req).await.unwrap();

        let pos = state.db.get_position(1, "ETH-USD").unwrap();
        assert_eq!(pos.qty, decmac!(2));
        assert_eq!(state.db.list_transactions(1, 50).into_iter().filter(|t| t.tx_type == "add").count(), 1);
    }

    #[tokio::test]
    async fn buy_rejects_when_cash_insufficient() {
        let state = test_state();
        let u = user(2);
        ensure_user(&state, &u);
        state.db.set_cash(2, decmac!(100));

        let req = TradeRequest { op_id: "b1".to_string(), symbol: "AAPL".to_string(), qty: decmac!(1), price_eur: Some(decmac!(150)), fees_eur: None };
        let err = buy(&state, &u, req.clone()).await.unwrap_err();
        assert!(matches!(err.code, portfolio_common::error::ErrorCode::Insufficient));
        assert_eq!(err.details.unwrap()["current_balance"], "100");

        // Replaying the same op_id must return the identical error, not
        // re-attempt the mutation (idempotent replay covers both arms).
        let err2 = buy(&state, &u, req).await.unwrap_err();
        assert_eq!(err2.message, "insufficient cash balance");
    }

    #[tokio::test]
    async fn buy_recomputes_weighted_average_cost() {
        let state = test_state();
        let u = user(3);
        ensure_user(&state, &u);
        state.db.set_cash(3, decmac!(10000));

        let first = TradeRequest { op_id: "buy1".to_string(), symbol: "AAPL".to_string(), qty: decmac!(10), price_eur: Some(decmac!(100)), fees_eur: None };
        buy(&state, &u, first).await.unwrap();
        let pos = state.db.get_position(3, "AAPL.US").unwrap();
        assert_eq!(pos.avg_cost_eur, decmac!(100));

        let second = TradeRequest { op_id: "buy2".to_string(), symbol: "AAPL".to_string(), qty: decmac!(5), price_eur: Some(decmac!(130)), fees_eur: None };
        buy(&state, &u, second).await.unwrap();
        let pos = state.db.get_position(3, "AAPL.US").unwrap();
        // (10*100 + 5*130) / 15 = 1650/15 = 110
        assert_eq!(pos.avg_cost_eur, decmac!(110));
        assert_eq!(pos.qty, decmac!(15));
    }

    #[tokio::test]
    async fn sell_full_position_deletes_row() {
        let state = test_state();
        let u = user(4);
        ensure_user(&state, &u);
        state.db.set_cash(4, decmac!(1000));
        state.db.upsert_position(4, "AAPL.US", "stock", "US", decmac!(3), decmac!(100), decmac!(100), "USD", None);

        let req = TradeRequest { op_id: "s1".to_string(), symbol: "AAPL".to_string(), qty: decmac!(3), price_eur: Some(decmac!(120)), fees_eur: None };
        sell(&state, &u, req).await.unwrap();

        assert!(state.db.get_position(4, "AAPL.US").is_none());
        assert_eq!(state.db.get_cash(4), decmac!(1360));
    }

    #[tokio::test]
    async fn sell_more_than_held_is_insufficient() {
        let state = test_state();
        let u = user(5);
        ensure_user(&state, &u);
        state.db.upsert_position(5, "AAPL.US", "stock", "US", decmac!(1), decmac!(100), decmac!(100), "USD", None);

        let req = TradeRequest { op_id: "s2".to_string(), symbol: "AAPL".to_string(), qty: decmac!(5), price_eur: Some(decmac!(120)), fees_eur: None };
        let err = sell(&state, &u, req).await.unwrap_err();
        assert!(matches!(err.code, portfolio_common::error::ErrorCode::Insufficient));
    }

    #[tokio::test]
    async fn cash_remove_to_exact_zero_is_allowed() {
        let state = test_state();
        let u = user(6);
        ensure_user(&state, &u);
        state.db.set_cash(6, decmac!(250));

        let req = CashMutationRequest { op_id: "c1".to_string(), amount_eur: decmac!(250) };
        cash_remove(&state, &u, req).await.unwrap();
        assert_eq!(state.db.get_cash(6), Decimal::ZERO);
    }

    #[tokio::test]
    async fn cash_remove_below_balance_is_insufficient_and_unchanged() {
        let state = test_state();
        let u = user(7);
        ensure_user(&state, &u);
        state.db.set_cash(7, decmac!(50));

        let req = CashMutationRequest { op_id: "c2".to_string(), amount_eur: decmac!(100) };
        let err = cash_remove(&state, &u, req).await.unwrap_err();
        assert!(matches!(err.code, portfolio_common::error::ErrorCode::Insufficient));
        assert_eq!(state.db.get_cash(7), decmac!(50));
    }

    #[tokio::test]
    async fn allocation_edit_rejects_non_100_sum() {
        let state = test_state();
        let u = user(8);
        ensure_user(&state, &u);

        let req = AllocationEditRequest { op_id: "al1".to_string(), stock_pct: 50, etf_pct: 30, crypto_pct: 10 };
        let err = allocation_edit(&state, &u, req).await.unwrap_err();
        assert!(matches!(err.code, portfolio_common::error::ErrorCode::BadInput));
        assert_eq!(err.details.unwrap()["total"], 90);

        let target = state.db.get_allocation(8);
        assert_eq!((target.stock_pct, target.etf_pct, target.crypto_pct), (60, 30, 10));
    }

    #[tokio::test]
    async fn remove_missing_position_is_not_found() {
        let state = test_state();
        let u = user(9);
        ensure_user(&state, &u);

        let req = RemovePositionRequest { op_id: "r1".to_string(), symbol: "AAPL".to_string() };
        let err = remove(&state, &u, req).await.unwrap_err();
        assert!(matches!(err.code, portfolio_common::error::ErrorCode::NotFound));
    }
}
