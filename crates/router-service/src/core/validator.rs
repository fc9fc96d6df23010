// =============================================================================
// Typed argument coercion and schema validation — ports
// `original_source/services/telegram_router/app/core/validator.py`
// =============================================================================

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use portfolio_common::money::{parse_eu_decimal, parse_eu_percent};

#[derive(Debug, Clone, Deserialize)]
pub struct ArgField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub many: bool,
    #[serde(default = "default_min_items")]
    pub min_items: usize,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub default: Option<Value>,
}

fn default_min_items() -> usize {
    1
}
fn default_max_items() -> usize {
    100
}

/// Symbol-like fields get uppercased after parsing for these commands, so a
/// caller typing `aapl` always normalizes consistently before the backend
/// ever sees it.
const UPPERCASE_SYMBOL_COMMANDS: &[&str] = &["/add", "/remove", "/buy", "/sell"];

/// Render a parsed numeric as a whole-number JSON value when it carries no
/// fraction, otherwise as a float. Downstream payload fields are a mix of
/// `Decimal` (qty, price, fees, delta_pct) and plain `i64` (allocation
/// percentages); both accept an integer-shaped JSON number, only `Decimal`
/// accepts a fractional one, so picking the narrowest representation keeps
/// every destination field happy without the validator knowing its type.
fn numeric_json(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::from(0))
    }
}

/// Coerce a single token against `field`'s declared type. Returns the parsed
/// JSON value or a human-readable error fragment (joined with `; ` by the
/// caller across multiple fields).
pub fn coerce_value(field: &ArgField, token: &str) -> Result<Value, String> {
    let name = &field.name;
    match field.kind.as_str() {
        "number" | "integer" => {
            let n = parse_eu_decimal(token).ok_or_else(|| format!("{name}: not a number"))?;
            let n = if field.kind == "integer" { n.trunc() } else { n };
            let f: f64 = n.try_into().unwrap_or(0.0);
            if let Some(min) = field.min {
                if f < min {
                    return Err(format!("{name}: below min {min}"));
                }
            }
            if let Some(max) = field.max {
                if f > max {
                    return Err(format!("{name}: above max {max}"));
                }
            }
            Ok(numeric_json(f))
        }
        "percent" => {
            let p = parse_eu_percent(token).ok_or_else(|| format!("{name}: not a percent"))?;
            let f: f64 = p.try_into().unwrap_or(0.0);
            if let Some(min) = field.min {
                if f < min {
                    return Err(format!("{name}: below min {min}%"));
                }
            }
            if let Some(max) = field.max {
                if f > max {
                    return Err(format!("{name}: above max {max}%"));
                }
            }
            Ok(numeric_json(f))
        }
        "enum" => {
            if !field.values.iter().any(|v| v == token) {
                return Err(format!("{name}: must be one of {:?}", field.values));
            }
            Ok(Value::String(token.to_string()))
        }
        _ => Ok(Value::String(token.to_string())),
    }
}

/// Fills required fields in schema order from `tokens`, falling back to
/// `prior_got` (a sticky session's previously-collected arguments). A `many`
/// field consumes every remaining token, so it must be last in a schema.
/// Returns `(values, missing_required_fields, joined_error)`.
pub fn validate_args(
    schema: &[ArgField],
    tokens: &[String],
    prior_got: &HashMap<String, Value>,
    cmd_name: &str,
) -> (HashMap<String, Value>, Vec<String>, Option<String>) {
    let mut values = prior_got.clone();
    let mut missing = Vec::new();
    let mut errors = Vec::new();
    let mut idx = 0usize;

    for field in schema {
        if values.get(&field.name).map(|v| !v.is_null()).unwrap_or(false) {
            continue;
        }

        if field.many {
            let mut items = Vec::new();
            let mut field_errs = Vec::new();
            while idx < tokens.len() {
                let tok = &tokens[idx];
                idx += 1;
                match coerce_value(field, tok) {
                    Ok(v) => items.push(v),
                    Err(e) => field_errs.push(e),
                }
            }
            if items.is_empty() && field.required {
                missing.push(field.name.clone());
            }
            if !items.is_empty() && items.len() > field.max_items {
                errors.push(format!("{}: too many (max {})", field.name, field.max_items));
            } else if !items.is_empty() && items.len() < field.min_items {
                errors.push(format!("{}: too few (min {})", field.name, field.min_items));
            } else if field_errs.is_empty() && !items.is_empty() {
                values.insert(field.name.clone(), Value::Array(items));
            } else {
                errors.extend(field_errs);
            }
            continue;
        }

        let tok = if idx < tokens.len() {
            let t = tokens[idx].clone();
            idx += 1;
            Some(t)
        } else {
            None
        };

        match tok {
            None => {
                if !field.required {
                    if let Some(default) = &field.default {
                        values.entry(field.name.clone()).or_insert_with(|| default.clone());
                        continue;
                    }
                }
                if field.required {
                    missing.push(field.name.clone());
                }
            }
            Some(t) => match coerce_value(field, &t) {
                Ok(v) => {
                    values.insert(field.name.clone(), v);
                }
                Err(e) => errors.push(e),
            },
        }
    }

    if UPPERCASE_SYMBOL_COMMANDS.contains(&cmd_name) {
        if let Some(Value::String(sym)) = values.get("symbol").cloned() {
            values.insert("symbol".to_string(), Value::String(sym.trim().to_ascii_uppercase()));
        }
    }

    if errors.is_empty() {
        (values, missing, None)
    } else {
        (values, missing, Some(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, kind: &str, required: bool) -> ArgField {
        ArgField {
            name: name.to_string(),
            kind: kind.to_string(),
            required,
            many: false,
            min_items: 1,
            max_items: 100,
            min: None,
            max: None,
            values: vec![],
            default: None,
        }
    }

    #[test]
    fn fills_required_fields_in_order() {
        let schema = vec![field("qty", "number", true), field("symbol", "string", true)];
        let tokens = vec!["2".to_string(), "aapl".to_string()];
        let (values, missing, err) = validate_args(&schema, &tokens, &HashMap::new(), "/buy");
        assert!(missing.is_empty());
        assert!(err.is_none());
        assert_eq!(values.get("symbol").unwrap(), "AAPL");
    }

    #[test]
    fn reports_missing_required() {
        let schema = vec![field("qty", "number", true), field("symbol", "string", true)];
        let (_, missing, _) = validate_args(&schema, &[], &HashMap::new(), "/buy");
        assert_eq!(missing, vec!["qty", "symbol"]);
    }

    #[test]
    fn eleven_symbols_rejected_by_max_items() {
        let mut f = field("symbols", "string", true);
        f.many = true;
        f.max_items = 10;
        let tokens: Vec<String> = (0..11).map(|i| format!("S{i}")).collect();
        let (_, _, err) = validate_args(&[f], &tokens, &HashMap::new(), "/price");
        assert!(err.unwrap().contains("too many"));
    }

    #[test]
    fn merges_with_prior_got() {
        let schema = vec![field("qty", "number", true), field("symbol", "string", true)];
        let mut prior = HashMap::new();
        prior.insert("qty".to_string(), serde_json::json!(2));
        let tokens = vec!["aapl".to_string()];
        let (values, missing, _) = validate_args(&schema, &tokens, &prior, "/buy");
        assert!(missing.is_empty());
        assert_eq!(values.get("qty").unwrap(), &serde_json::json!(2));
        assert_eq!(values.get("symbol").unwrap(), "AAPL");
    }
}
