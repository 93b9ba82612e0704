// File: modlogs-common/src/models/user.rs

use serde::{Deserialize, Serialize};

/// Cached Twitch identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitchUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

/// Token returned from the authorization-code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct UserAccessToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Vec<String>,
}
