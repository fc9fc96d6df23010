// =============================================================================
// User identity carried on every cross-service call
// =============================================================================
//
// Grounded in `original_source/services/portfolio_core/app/models.py::UserContext`.
// The router resolves this once per chat update and forwards it as request
// metadata to whichever downstream service handles the command.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

impl UserContext {
    pub fn display_name(&self) -> String {
        match (&self.first_name, self.username.as_ref()) {
            (Some(first), _) if !first.is_empty() => first.clone(),
            (_, Some(u)) => format!("@{u}"),
            _ => self.user_id.to_string(),
        }
    }
}
