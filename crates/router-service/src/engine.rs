// =============================================================================
// Conversational state machine — ports
// `original_source/services/telegram_router/app/app.py::process_text`
// =============================================================================
//
// Owns the one big branch-tree that walks an inbound chat message from raw
// text to outbound reply pages: the ownership gate, command resolution,
// session merge, the `/remove`/`/cash_remove` confirmation detour, argument
// validation and prompting, the dispatch call, and the per-command success
// rendering. Idempotent-update de-duplication happens one layer up, in the
// webhook route, exactly as in the original (`process_text` itself is never
// told about `update_id`).
// =============================================================================

use std::collections::HashMap;

use serde_json::{Map, Value};

use portfolio_common::error::ErrorCode;
use portfolio_common::UserContext;

use crate::app_state::AppState;
use crate::core::parser::parse_text;
use crate::core::registry::{CommandSpec, DispatchSpec};
use crate::core::sessions::{self, ConfirmBlock, Session};
use crate::core::validator::validate_args;
use crate::dispatcher::{self, DispatchResult};
use crate::handlers::{market, portfolio, system, trading};
use crate::models::TelegramUser;
use crate::screens;

/// Commands whose prompt-when-empty behavior is suppressed even though their
/// schema is non-empty — either because every field has a usable default
/// (`/tx`), or because the command takes no meaningful "partial" input at all
/// (read-only snapshots, `/fx`, `/help` family). Mirrors the original's
/// hardcoded `should_prompt_when_empty` exclusion list.
const NO_PROMPT_COMMANDS: &[&str] = &[
    "/help",
    "/cancel",
    "/exit",
    "/portfolio",
    "/cash",
    "/allocation",
    "/tx",
    "/fx",
    "/portfolio_snapshot",
    "/portfolio_summary",
    "/portfolio_breakdown",
    "/portfolio_digest",
    "/portfolio_movers",
];

const ANALYTICS_COMMANDS: &[&str] = &["/portfolio_snapshot", "/portfolio_summary", "/portfolio_breakdown", "/portfolio_digest", "/portfolio_movers", "/po_if"];

fn ttl_minutes(state: &AppState) -> i64 {
    state.config.session_ttl_sec / 60
}

fn user_context_from(sender_id: i64, sender: &TelegramUser) -> UserContext {
    UserContext {
        user_id: sender_id,
        first_name: sender.first_name.clone(),
        last_name: sender.last_name.clone().unwrap_or_default(),
        username: sender.username.clone(),
        language_code: sender.language_code.clone(),
    }
}

fn map_to_values(map: &Map<String, Value>) -> HashMap<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn values_to_map(values: &HashMap<String, Value>) -> Map<String, Value> {
    values.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

pub async fn process_text(state: &AppState, chat_id: i64, sender_id: i64, sender: &TelegramUser, text: &str) -> Vec<String> {
    if !state.config.owner_ids.is_empty() && !state.config.owner_ids.contains(&sender_id) {
        return screens::not_authorized();
    }

    let bot_username = state.config.telegram_bot_username.as_deref();
    let (cmd_opt, mut tokens) = parse_text(text, bot_username);

    let cmd = match cmd_opt {
        Some(c) => c,
        None => match state.sessions.get(chat_id) {
            Some(session) => {
                tokens.retain(|t| !t.is_empty());
                session.cmd
            }
            None => return screens::unknown_input(),
        },
    };

    if cmd == "/cancel" {
        state.sessions.clear(chat_id);
        return system::render_cancel();
    }
    if cmd == "/exit" {
        state.sessions.clear(chat_id);
        return system::render_exit();
    }
    if cmd == "/help" {
        return system::render_help(&state.registry);
    }

    let Some(spec) = state.registry.get(&cmd) else {
        return screens::unknown_command(&cmd);
    };

    let mut existing = state.sessions.get(chat_id).unwrap_or_default();
    if sessions::should_clear_session(existing.sticky, &existing.cmd, &spec.name) {
        state.sessions.clear(chat_id);
        existing = Session::default();
    }

    let got: HashMap<String, Value> = if existing.cmd == spec.name { map_to_values(&existing.got) } else { HashMap::new() };

    if (spec.name == "/buy" || spec.name == "/sell") && !tokens.is_empty() {
        tokens.retain(|t| !matches!(t.to_ascii_lowercase().as_str(), "at" | "@"));
    }

    let mut dispatch_override: Option<HashMap<String, Value>> = None;

    if (spec.name == "/cash_remove" || spec.name == "/remove") && !text.trim().starts_with('/') {
        if let Some(confirm) = existing.confirm.clone() {
            let (should_proceed, dispatch_values, response_pages) = handle_confirmation_response(state, chat_id, &spec, text, &tokens, &confirm);
            if let Some(pages) = response_pages {
                return pages;
            }
            if should_proceed {
                dispatch_override = dispatch_values;
                tokens = Vec::new();
            }
        }
    }

    let (values, missing, err) = if let Some(dv) = &dispatch_override {
        (dv.clone(), Vec::new(), None)
    } else {
        validate_args(&spec.args_schema, &tokens, &got, &spec.name)
    };
    let mut values = values;

    if let Some(e) = err {
        return screens::invalid_template(&e, &spec.help.usage, &spec.help.example);
    }

    if spec.name == "/rename" {
        if let Some(Value::Array(parts)) = values.get("display_name").cloned() {
            let joined = parts.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>().join(" ");
            values.insert("display_name".to_string(), Value::String(joined));
        }
        if tokens.len() >= 2 {
            values.insert("display_name".to_string(), Value::String(tokens[1..].join(" ").trim().to_string()));
        }
    }

    let should_prompt_when_empty = !spec.args_schema.is_empty() && !NO_PROMPT_COMMANDS.contains(&spec.name.as_str());
    let user_provided_no_args = tokens.is_empty() && got.is_empty();

    if dispatch_override.is_none() && (!missing.is_empty() || (should_prompt_when_empty && user_provided_no_args)) {
        return render_prompt(state, chat_id, &spec, &values).await;
    }

    // Ready to dispatch. Sticky sessions stay alive across successful turns;
    // every other command's session dies the instant a reply goes out.
    let is_sticky = state.registry.is_sticky(&spec.name);
    let clear_after = !(is_sticky && existing.cmd == spec.name && existing.sticky);

    let user = user_context_from(sender_id, sender);

    if spec.dispatch.service.as_deref() == Some("portfolio_core") {
        if sender_id == 0 {
            return screens::service_error("User context unavailable. Please retry.", &spec.help.usage, &spec.help.example);
        }
        if dispatch_override.is_none() {
            if spec.name == "/cash_remove" {
                return start_cash_remove_confirmation(state, chat_id, &spec, values);
            }
            if spec.name == "/remove" {
                return start_remove_confirmation(state, chat_id, &spec, values);
            }
        }
    }

    let dispatch_values = dispatch_override.unwrap_or_else(|| values.clone());
    let result = dispatcher::dispatch(state, &spec.dispatch, &dispatch_values, &user).await;

    if !result.ok {
        return handle_dispatch_error(state, chat_id, &spec, &values, &result);
    }

    render_success(state, chat_id, &spec, &values, &result, clear_after).await
}

async fn render_prompt(state: &AppState, chat_id: i64, spec: &CommandSpec, values: &HashMap<String, Value>) -> Vec<String> {
    let ttl_min = ttl_minutes(state);
    let sticky = state.registry.is_sticky(&spec.name);
    let session = Session { cmd: spec.name.clone(), got: values_to_map(values), sticky, confirm: None };
    state.sessions.set(chat_id, &session);

    match spec.name.as_str() {
        "/price" => screens::price_prompt(ttl_min),
        "/fx" => screens::fx_prompt(ttl_min),
        "/cash_remove" => {
            let cash_display = fetch_cash_balance_display(state, chat_id).await;
            vec![format!("Current cash: {cash_display}.\n{}\nSession ends after {ttl_min} min of inactivity.", spec.help.usage)]
        }
        "/allocation_edit" => {
            let (stock, etf, crypto) = fetch_allocation_targets(state, chat_id).await;
            portfolio::render_allocation_edit_prompt(&serde_json::json!({"stock_pct": stock, "etf_pct": etf, "crypto_pct": crypto}), ttl_min)
        }
        _ => screens::generic_prompt(&spec.help.usage, ttl_min),
    }
}

async fn fetch_cash_balance_display(state: &AppState, chat_id: i64) -> String {
    let placeholder_user = UserContext { user_id: chat_id, first_name: None, last_name: String::new(), username: None, language_code: None };
    let spec = DispatchSpec { service: Some("portfolio_core".to_string()), method: Some("GET".to_string()), path: Some("/cash".to_string()), args_map: HashMap::new() };
    let result = dispatcher::dispatch(state, &spec, &HashMap::new(), &placeholder_user).await;
    if !result.ok {
        return "€0.00".to_string();
    }
    match result.data.get("cash_eur").and_then(|v| v.as_str()) {
        Some(s) => format!("€{s}"),
        None => "€0.00".to_string(),
    }
}

async fn fetch_allocation_targets(state: &AppState, chat_id: i64) -> (i64, i64, i64) {
    let placeholder_user = UserContext { user_id: chat_id, first_name: None, last_name: String::new(), username: None, language_code: None };
    let spec = DispatchSpec { service: Some("portfolio_core".to_string()), method: Some("GET".to_string()), path: Some("/allocation".to_string()), args_map: HashMap::new() };
    let result = dispatcher::dispatch(state, &spec, &HashMap::new(), &placeholder_user).await;
    if !result.ok {
        return (0, 0, 0);
    }
    let target = result.data.get("target").cloned().unwrap_or(Value::Null);
    let get = |k: &str| target.get(k).and_then(|v| v.as_i64()).unwrap_or(0);
    (get("stock_pct"), get("etf_pct"), get("crypto_pct"))
}

fn start_remove_confirmation(state: &AppState, chat_id: i64, spec: &CommandSpec, values: HashMap<String, Value>) -> Vec<String> {
    let symbol = values.get("symbol").and_then(|v| v.as_str()).unwrap_or("").to_ascii_uppercase();
    if symbol.is_empty() {
        return screens::invalid_template("symbol is required", &spec.help.usage, &spec.help.example);
    }
    let payload = values_to_map(&values);
    let session = Session { cmd: spec.name.clone(), got: payload.clone(), sticky: false, confirm: Some(ConfirmBlock { action: spec.name.clone(), payload, prompt: String::new() }) };
    state.sessions.set(chat_id, &session);
    portfolio::render_remove_confirm(&symbol)
}

fn start_cash_remove_confirmation(state: &AppState, chat_id: i64, spec: &CommandSpec, values: HashMap<String, Value>) -> Vec<String> {
    let amount = values.get("amount_eur").and_then(value_to_f64).unwrap_or(0.0);
    if amount <= 0.0 {
        return screens::invalid_template("amount must be greater than 0", &spec.help.usage, &spec.help.example);
    }
    let amount_display = format!("€{amount:.2}");
    let payload = values_to_map(&values);
    let session = Session { cmd: spec.name.clone(), got: payload.clone(), sticky: false, confirm: Some(ConfirmBlock { action: spec.name.clone(), payload, prompt: String::new() }) };
    state.sessions.set(chat_id, &session);
    portfolio::render_cash_remove_confirm(&amount_display)
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Handles a free-text reply while a `/remove` or `/cash_remove` confirmation
/// is pending. Returns `(should_proceed, dispatch_values, response_pages)`:
/// exactly one of the latter two is populated.
fn handle_confirmation_response(
    _state: &AppState,
    chat_id: i64,
    spec: &CommandSpec,
    text: &str,
    tokens: &[String],
    confirm: &ConfirmBlock,
) -> (bool, Option<HashMap<String, Value>>, Option<Vec<String>>) {
    let answer = tokens.first().cloned().unwrap_or_else(|| text.to_string()).trim().to_ascii_lowercase();

    if answer == "y" || answer == "yes" {
        return (true, Some(map_to_values(&confirm.payload)), None);
    }

    if answer == "n" || answer == "no" {
        let pages = if spec.name == "/remove" {
            let symbol = confirm.payload.get("symbol").and_then(|v| v.as_str()).unwrap_or("").to_ascii_uppercase();
            _state_clear(_state, chat_id);
            portfolio::render_remove_cancelled(&symbol)
        } else if spec.name == "/cash_remove" {
            let amount = confirm.payload.get("amount_eur").and_then(value_to_f64).unwrap_or(0.0);
            _state_clear(_state, chat_id);
            portfolio::render_cash_remove_cancelled(&format!("€{amount:.2}"))
        } else {
            _state_clear(_state, chat_id);
            screens::service_error("Cancelled", "", "")
        };
        return (false, None, Some(pages));
    }

    let pages = if spec.name == "/remove" {
        let symbol = confirm.payload.get("symbol").and_then(|v| v.as_str()).unwrap_or("").to_ascii_uppercase();
        portfolio::render_remove_confirm(&symbol)
    } else if spec.name == "/cash_remove" {
        let amount = confirm.payload.get("amount_eur").and_then(value_to_f64).unwrap_or(0.0);
        portfolio::render_cash_remove_confirm(&format!("€{amount:.2}"))
    } else {
        screens::service_error("Please reply Y or N", "", "")
    };
    (false, None, Some(pages))
}

fn _state_clear(state: &AppState, chat_id: i64) {
    state.sessions.clear(chat_id);
}

fn handle_dispatch_error(state: &AppState, chat_id: i64, spec: &CommandSpec, values: &HashMap<String, Value>, result: &DispatchResult) -> Vec<String> {
    let err = result.error.clone().unwrap_or(portfolio_common::envelope::ErrorBody {
        code: ErrorCode::Internal,
        message: "Internal error".to_string(),
        source: "router".to_string(),
        retriable: false,
        details: None,
    });

    if spec.name == "/fx" {
        let base = values.get("base").and_then(|v| v.as_str()).unwrap_or("");
        let quote = values.get("quote").and_then(|v| v.as_str()).unwrap_or("");
        return market::render_fx_error(base, quote, &spec.help.usage, &spec.help.example);
    }

    if spec.name == "/remove" && err.code == ErrorCode::NotFound {
        let symbol = values.get("symbol").and_then(|v| v.as_str()).unwrap_or("").to_ascii_uppercase();
        state.sessions.clear(chat_id);
        return portfolio::render_remove_not_owned(&symbol);
    }

    if spec.name == "/cash_remove" || spec.name == "/remove" {
        state.sessions.clear(chat_id);
    }

    screens::service_error(&err.message, &spec.help.usage, &spec.help.example)
}

async fn render_success(state: &AppState, chat_id: i64, spec: &CommandSpec, values: &HashMap<String, Value>, result: &DispatchResult, clear_after: bool) -> Vec<String> {
    let ttl_min = ttl_minutes(state);

    match spec.name.as_str() {
        "/price" => {
            let requested: Vec<String> = match values.get("symbols") {
                Some(Value::Array(a)) => a.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect(),
                _ => Vec::new(),
            };
            let error_details = result.error.as_ref().and_then(|e| e.details.as_ref());
            let render = market::render_price(&result.data, error_details, result.partial, &requested, ttl_min);
            if render.has_missing || result.partial || !clear_after {
                let session = Session { cmd: spec.name.clone(), got: Map::new(), sticky: true, confirm: None };
                state.sessions.set(chat_id, &session);
            } else {
                state.sessions.clear(chat_id);
            }
            render.pages
        }
        "/fx" => {
            let base = values.get("base").and_then(|v| v.as_str()).unwrap_or("");
            let quote = values.get("quote").and_then(|v| v.as_str()).unwrap_or("");
            let render = market::render_fx(&result.data, base, quote, ttl_min);
            let fx_prompting = result.data.get("fx_prompt").and_then(|v| v.as_bool()).unwrap_or(false);
            if fx_prompting || !clear_after {
                let session = Session { cmd: spec.name.clone(), got: Map::new(), sticky: true, confirm: None };
                state.sessions.set(chat_id, &session);
            } else {
                state.sessions.clear(chat_id);
            }
            render.pages
        }
        "/portfolio" => portfolio::render_portfolio_snapshot(&result.data),
        "/add" => {
            let symbol = values.get("symbol").and_then(|v| v.as_str()).unwrap_or("");
            let qty = values.get("qty").and_then(|v| v.as_f64()).map(|f| screens::strip_trailing_zeros_4dp(f)).unwrap_or_default();
            state.sessions.clear(chat_id);
            portfolio::render_add(symbol, &qty, &result.data)
        }
        "/remove" => {
            let symbol = values.get("symbol").and_then(|v| v.as_str()).unwrap_or("");
            state.sessions.clear(chat_id);
            portfolio::render_remove(symbol, &result.data)
        }
        "/buy" | "/sell" => {
            let symbol = values.get("symbol").and_then(|v| v.as_str()).unwrap_or("");
            let qty = values.get("qty").and_then(value_to_decimal_for_display).unwrap_or_default();
            let price = values.get("price_eur").and_then(value_to_decimal_for_display);
            let price_display = trading::resolve_price_display(state, symbol, price).await;
            state.sessions.clear(chat_id);
            if spec.name == "/buy" {
                trading::render_buy(symbol, qty, &price_display)
            } else {
                trading::render_sell(symbol, qty, &price_display)
            }
        }
        "/cash_add" => {
            let amount = values.get("amount_eur").and_then(value_to_f64).unwrap_or(0.0);
            state.sessions.clear(chat_id);
            portfolio::render_cash_add(&format!("€{amount:.2}"))
        }
        "/cash_remove" => {
            let amount = values.get("amount_eur").and_then(value_to_f64).unwrap_or(0.0);
            state.sessions.clear(chat_id);
            portfolio::render_cash_remove(&format!("€{amount:.2}"), &result.data)
        }
        "/cash" => {
            state.sessions.clear(chat_id);
            portfolio::render_cash(&result.data)
        }
        "/tx" => {
            state.sessions.clear(chat_id);
            portfolio::render_transactions(&result.data)
        }
        "/allocation" => {
            state.sessions.clear(chat_id);
            portfolio::render_allocation(&result.data)
        }
        "/allocation_edit" => {
            let stock = values.get("stock_pct").and_then(|v| v.as_i64()).unwrap_or(0);
            let etf = values.get("etf_pct").and_then(|v| v.as_i64()).unwrap_or(0);
            let crypto = values.get("crypto_pct").and_then(|v| v.as_i64()).unwrap_or(0);
            state.sessions.clear(chat_id);
            portfolio::render_allocation_edit_success(&result.data, stock, etf, crypto)
        }
        "/rename" => {
            let rename = result.data.get("rename").cloned().unwrap_or(Value::Null);
            let symbol = rename.get("symbol").and_then(|v| v.as_str()).or_else(|| values.get("symbol").and_then(|v| v.as_str())).unwrap_or("");
            let nickname = rename.get("display_name").and_then(|v| v.as_str()).or_else(|| values.get("display_name").and_then(|v| v.as_str())).unwrap_or("");
            state.sessions.clear(chat_id);
            portfolio::render_rename(symbol, nickname)
        }
        name if ANALYTICS_COMMANDS.contains(&name) => {
            state.sessions.clear(chat_id);
            portfolio::render_analytics_placeholder(&name[1..])
        }
        _ => {
            state.sessions.clear(chat_id);
            screens::service_error("Unrecognized command outcome", &spec.help.usage, &spec.help.example)
        }
    }
}

fn value_to_decimal_for_display(v: &Value) -> Option<rust_decimal::Decimal> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64().and_then(|f| rust_decimal::Decimal::try_from(f).ok()),
        _ => None,
    }
}
