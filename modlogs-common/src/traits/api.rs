// File: modlogs-common/src/traits/api.rs

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Error;
use crate::models::{ModerationAction, ModerationEmbed, TwitchUser, UpstreamSubscription, UserAccessToken};

/// Body of an EventSub webhook subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSubscription {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub condition: SubscriptionCondition,
    pub transport: WebhookTransport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionCondition {
    pub broadcaster_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookTransport {
    pub method: String,
    pub callback: String,
    pub secret: String,
}

impl CreateSubscription {
    pub fn webhook(
        action: ModerationAction,
        streamer_id: &str,
        callback: String,
        secret: &str,
    ) -> Self {
        Self {
            kind: action.event_type().to_string(),
            version: ModerationAction::VERSION.to_string(),
            condition: SubscriptionCondition {
                broadcaster_user_id: streamer_id.to_string(),
            },
            transport: WebhookTransport {
                method: "webhook".to_string(),
                callback,
                secret: secret.to_string(),
            },
        }
    }
}

/// Twitch identity and EventSub API, authenticated with the app token.
#[async_trait]
pub trait TwitchApi: Send + Sync {
    async fn get_users(&self, ids: &[String], logins: &[String]) -> Result<Vec<TwitchUser>, Error>;

    /// The user owning `access_token`.
    async fn get_token_user(&self, access_token: &str) -> Result<Option<TwitchUser>, Error>;

    async fn exchange_code(&self, code: &str) -> Result<UserAccessToken, Error>;

    /// Returns the id the provider assigned to the new subscription.
    async fn create_subscription(&self, request: &CreateSubscription) -> Result<String, Error>;

    async fn list_subscriptions(&self) -> Result<Vec<UpstreamSubscription>, Error>;

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), Error>;
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), Error>;

    async fn send_embed(&self, channel_id: &str, embed: &ModerationEmbed) -> Result<(), Error>;

    /// Whether the bot is still a member of the guild.
    async fn is_guild_member(&self, guild_id: &str) -> Result<bool, Error>;
}
