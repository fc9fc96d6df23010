// =============================================================================
// Inbound wire types — ports
// `original_source/services/telegram_router/app/models.py`
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<RawMessage>,
}

/// Mirrors Telegram's actual field name (`from`), unlike `TelegramMessage`
/// above which is kept as a simplified internal shape for tests.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
    #[serde(rename = "from", default)]
    pub sender: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

impl TelegramUpdate {
    /// Extracts the minimal fields the router consumes, per spec §6.1.
    /// Returns `None` when the update carries no text-bearing message.
    pub fn text_message(&self) -> Option<(i64, i64, TelegramUser, String)> {
        let msg = self.message.as_ref()?;
        let text = msg.text.clone().or_else(|| msg.caption.clone())?;
        let sender = msg.sender.clone().unwrap_or(TelegramUser { id: 0, ..Default::default() });
        Some((msg.chat.id, msg.message_id, sender, text))
    }
}

/// Body for the `/telegram/test` development endpoint: lets an operator
/// exercise the state machine without a real Telegram update payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TestRouteIn {
    pub chat_id: i64,
    #[serde(default)]
    pub sender_id: Option<i64>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestRouteOut {
    pub pages: Vec<String>,
}

/// Body for `POST /auth/telegram`: the WebApp `initData` string plus the
/// fields the HMAC check validates against.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramAuthIn {
    pub init_data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelegramAuthOut {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}
