// File: modlogs-common/src/models/subscription.rs

use serde::{Deserialize, Serialize};

/// Shared HMAC secret for one (event type, streamer) subscription, plus the
/// upstream subscription id once the verification challenge arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSecret {
    pub secret: String,
    pub subscription_id: Option<String>,
}

/// One row of the upstream subscription listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamSubscription {
    pub id: String,
    pub status: String,
    pub kind: String,
    pub broadcaster_user_id: Option<String>,
}

impl UpstreamSubscription {
    pub const ENABLED: &'static str = "enabled";

    pub fn is_enabled(&self) -> bool {
        self.status == Self::ENABLED
    }
}
