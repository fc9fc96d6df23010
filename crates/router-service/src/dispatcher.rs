// =============================================================================
// Backend dispatcher — ports
// `original_source/services/telegram_router/app/core/dispatcher.py::Dispatcher`
// =============================================================================
//
// Maps a resolved command's `args_map` onto a backend payload and routes it
// to the right service. `fx_prompt`, the GET-only `0.2s * (n+1)` retry, and
// the portfolio-core query/body split (user context is query parameters on
// GET, folded into the JSON body alongside domain fields on POST — matching
// portfolio-core-service's actual `Json<AddBody>`-style flattened extractors
// rather than spec.md §6.3's literal "query parameters on every call") all
// live here, same as `market_client.rs`'s retry loop in portfolio-core.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use portfolio_common::envelope::ErrorBody;
use portfolio_common::error::ErrorCode;
use portfolio_common::UserContext;

use crate::app_state::AppState;
use crate::core::registry::DispatchSpec;

/// The dispatcher's own envelope-shaped result; deliberately a bag of JSON
/// rather than a typed struct since each handler reaches into a different
/// subset of `data`.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub ok: bool,
    pub data: Value,
    pub partial: bool,
    pub error: Option<ErrorBody>,
}

impl DispatchResult {
    fn ok(data: Value) -> Self {
        Self { ok: true, data, partial: false, error: None }
    }

    fn upstream_err(source: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: Value::Null,
            partial: false,
            error: Some(ErrorBody { code: ErrorCode::UpstreamError, message: message.into(), source: source.to_string(), retriable: true, details: None }),
        }
    }

    fn from_envelope(source: &str, body: Value) -> Self {
        let ok = body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false);
        if !ok {
            let error = body.get("error").cloned().and_then(|e| serde_json::from_value::<ErrorBody>(e).ok()).unwrap_or_else(|| ErrorBody {
                code: ErrorCode::UpstreamError,
                message: "upstream returned ok:false without an error body".to_string(),
                source: source.to_string(),
                retriable: true,
                details: None,
            });
            return Self { ok: false, data: Value::Null, partial: false, error: Some(error) };
        }
        let partial = body.get("partial").and_then(|v| v.as_bool()).unwrap_or(false);
        let error = body.get("error").cloned().and_then(|e| serde_json::from_value::<ErrorBody>(e).ok());
        Self { ok: true, data: body.get("data").cloned().unwrap_or(Value::Null), partial, error }
    }
}

fn build_payload(args_map: &HashMap<String, String>, values: &HashMap<String, Value>) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    for (from, to) in args_map {
        if let Some(v) = values.get(from) {
            payload.insert(to.clone(), v.clone());
        }
    }
    payload
}

/// GET requests retry with `0.2s * (n+1)` backoff up to `retries`; POSTs and
/// any 4xx-status response never retry (caller-supplied `op_id` is what
/// makes a caller's own retry of a POST safe, not us retrying on its behalf).
async fn send_get(client: &reqwest::Client, url: &str, query: &[(String, String)], retries: u32) -> Result<Value, String> {
    let mut attempt = 0u32;
    loop {
        let resp = client.get(url).query(query).send().await;
        match resp {
            Ok(r) => return r.json::<Value>().await.map_err(|e| e.to_string()),
            Err(e) => {
                attempt += 1;
                if attempt > retries {
                    return Err(e.to_string());
                }
                tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
            }
        }
    }
}

async fn send_post(client: &reqwest::Client, url: &str, query: &[(String, String)], body: &Value) -> Result<Value, String> {
    client.post(url).query(query).json(body).send().await.map_err(|e| e.to_string())?.json::<Value>().await.map_err(|e| e.to_string())
}

fn query_pairs(user: &UserContext) -> Vec<(String, String)> {
    let mut q = vec![("user_id".to_string(), user.user_id.to_string())];
    if let Some(f) = &user.first_name {
        q.push(("first_name".to_string(), f.clone()));
    }
    if !user.last_name.is_empty() {
        q.push(("last_name".to_string(), user.last_name.clone()));
    }
    if let Some(u) = &user.username {
        q.push(("username".to_string(), u.clone()));
    }
    if let Some(l) = &user.language_code {
        q.push(("language_code".to_string(), l.clone()));
    }
    q
}

pub async fn dispatch(state: &AppState, spec: &DispatchSpec, values: &HashMap<String, Value>, user: &UserContext) -> DispatchResult {
    let payload = build_payload(&spec.args_map, values);
    let method = spec.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
    let service = spec.service.as_deref().unwrap_or("");
    let path = spec.path.as_deref().unwrap_or("/");

    match service {
        "market_data" if path == "/quote" && method == "GET" => {
            let symbols: Vec<String> = match payload.get("symbols") {
                Some(Value::Array(a)) => a.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect(),
                Some(Value::String(s)) => vec![s.clone()],
                _ => Vec::new(),
            };
            let url = format!("{}/quote", state.config.market_data_base_url.trim_end_matches('/'));
            let joined = symbols.join(",");
            match send_get(&state.http, &url, &[("symbols".to_string(), joined)], state.config.http_retries).await {
                Ok(body) => DispatchResult::from_envelope("market_data", body),
                Err(e) => {
                    warn!(error = %e, "market_data /quote dispatch failed");
                    DispatchResult::upstream_err("market_data", e)
                }
            }
        }
        "fx" if path == "/fx" && method == "GET" => {
            let base = payload.get("base").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
            let quote = payload.get("quote").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
            if base.is_empty() || quote.is_empty() {
                return DispatchResult::ok(serde_json::json!({ "fx_prompt": true }));
            }
            let pair = format!("{}_{}", base.to_ascii_uppercase(), quote.to_ascii_uppercase());
            let url = format!("{}/fx", state.config.fx_base_url.trim_end_matches('/'));
            match send_get(&state.http, &url, &[("pair".to_string(), pair), ("force".to_string(), "true".to_string())], state.config.http_retries).await {
                // fx-service speaks plain JSON on its happy path, not the
                // {ok,data} envelope (see fx-service/src/routes.rs); a
                // "detail" field marks its error shape instead.
                Ok(body) => {
                    if let Some(detail) = body.get("detail").and_then(|v| v.as_str()) {
                        DispatchResult::upstream_err("fx", detail.to_string())
                    } else {
                        DispatchResult::ok(body)
                    }
                }
                Err(e) => {
                    warn!(error = %e, "fx /fx dispatch failed");
                    DispatchResult::upstream_err("fx", e)
                }
            }
        }
        "portfolio_core" => {
            let base = state.config.portfolio_core_base_url.trim_end_matches('/');
            let url = format!("{base}{path}");
            if method == "GET" {
                let mut query = query_pairs(user);
                for (k, v) in &payload {
                    if let Some(s) = value_to_query_string(v) {
                        query.push((k.clone(), s));
                    }
                }
                match send_get(&state.http, &url, &query, state.config.http_retries).await {
                    Ok(body) => DispatchResult::from_envelope("portfolio_core", body),
                    Err(e) => {
                        warn!(error = %e, path, "portfolio_core GET dispatch failed");
                        DispatchResult::upstream_err("portfolio_core", e)
                    }
                }
            } else {
                let mut body_map = serde_json::Map::new();
                body_map.insert("user_id".to_string(), serde_json::json!(user.user_id));
                if let Some(f) = &user.first_name {
                    body_map.insert("first_name".to_string(), serde_json::json!(f));
                }
                if !user.last_name.is_empty() {
                    body_map.insert("last_name".to_string(), serde_json::json!(user.last_name));
                }
                if let Some(u) = &user.username {
                    body_map.insert("username".to_string(), serde_json::json!(u));
                }
                if let Some(l) = &user.language_code {
                    body_map.insert("language_code".to_string(), serde_json::json!(l));
                }
                for (k, v) in &payload {
                    body_map.insert(k.clone(), v.clone());
                }
                if !body_map.contains_key("op_id") {
                    body_map.insert("op_id".to_string(), serde_json::json!(Uuid::new_v4().simple().to_string()));
                }
                match send_post(&state.http, &url, &[], &Value::Object(body_map)).await {
                    Ok(body) => DispatchResult::from_envelope("portfolio_core", body),
                    Err(e) => {
                        warn!(error = %e, path, "portfolio_core POST dispatch failed");
                        DispatchResult::upstream_err("portfolio_core", e)
                    }
                }
            }
        }
        _ => DispatchResult::upstream_err("router", format!("no route for {service} {method} {path}")),
    }
}

fn value_to_query_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(a) => {
            let parts: Vec<String> = a.iter().filter_map(value_to_query_string).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
        _ => None,
    }
}
