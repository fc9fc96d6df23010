// =============================================================================
// Telegram WebApp `initData` validation — HMAC-SHA256
// =============================================================================
//
// Generalizes the teacher's own HMAC-signing pattern
// (`binance/client.rs::sign`, `Hmac<Sha256>` + `hex::encode`) from Binance's
// flat query-string signing to Telegram's two-stage WebApp scheme: a secret
// key is first derived from the bot token (`HMAC_SHA256("WebAppData",
// bot_token)`), then that secret signs the sorted `data_check_string`
// (`HMAC_SHA256(secret, data_check_string)`). See
// https://core.telegram.org/bots/webapps#validating-data-received-via-the-web-app
// — reachable only from `init_data`, a caller-supplied string, so this
// module never logs the bot token or the raw `hash` field.
// =============================================================================

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug)]
pub struct WebAppAuth {
    pub user_id: Option<i64>,
}

/// Validates a Telegram WebApp `init_data` query string against `bot_token`.
/// Returns the authenticated `user_id` on success.
pub fn validate_init_data(init_data: &str, bot_token: &str) -> Option<WebAppAuth> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut hash: Option<String> = None;
    let mut user_id: Option<i64> = None;

    for kv in init_data.split('&') {
        let (k, v) = kv.split_once('=')?;
        let decoded = percent_decode(v);
        if k == "hash" {
            hash = Some(decoded);
            continue;
        }
        if k == "user" {
            user_id = extract_user_id(&decoded);
        }
        pairs.push((k.to_string(), decoded));
    }
    let hash = hash?;

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let data_check_string = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("\n");

    let mut secret_mac = HmacSha256::new_from_slice(b"WebAppData").expect("HMAC accepts any key size");
    secret_mac.update(bot_token.as_bytes());
    let secret_key = secret_mac.finalize().into_bytes();

    let mut data_mac = HmacSha256::new_from_slice(&secret_key).expect("HMAC accepts any key size");
    data_mac.update(data_check_string.as_bytes());
    let computed = hex::encode(data_mac.finalize().into_bytes());

    if computed != hash {
        return None;
    }
    Some(WebAppAuth { user_id })
}

fn extract_user_id(user_json: &str) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_str(user_json).ok()?;
    value.get("id").and_then(|v| v.as_i64())
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(data_check_string: &str, bot_token: &str) -> String {
        let mut secret_mac = HmacSha256::new_from_slice(b"WebAppData").unwrap();
        secret_mac.update(bot_token.as_bytes());
        let secret_key = secret_mac.finalize().into_bytes();
        let mut data_mac = HmacSha256::new_from_slice(&secret_key).unwrap();
        data_mac.update(data_check_string.as_bytes());
        hex::encode(data_mac.finalize().into_bytes())
    }

    #[test]
    fn valid_hash_round_trips_user_id() {
        let token = "123:ABC";
        let user = r#"{"id":42,"first_name":"Ada"}"#;
        let check_string = format!("auth_date=1700000000\nuser={user}");
        let hash = sign(&check_string, token);
        let init_data = format!("auth_date=1700000000&user={}&hash={hash}", urlencode(user));
        let result = validate_init_data(&init_data, token).unwrap();
        assert_eq!(result.user_id, Some(42));
    }

    #[test]
    fn tampered_payload_fails() {
        let token = "123:ABC";
        let init_data = "auth_date=1700000000&user=%7B%22id%22%3A42%7D&hash=deadbeef";
        assert!(validate_init_data(init_data, token).is_none());
    }

    fn urlencode(s: &str) -> String {
        s.bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
                _ => format!("%{b:02X}"),
            })
            .collect()
    }
}
