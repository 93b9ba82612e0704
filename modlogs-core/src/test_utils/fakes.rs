// File: modlogs-core/src/test_utils/fakes.rs
//
// Recording fakes for the Twitch API and the chat platform.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use modlogs_common::models::{ModerationEmbed, TwitchUser, UpstreamSubscription, UserAccessToken};
use modlogs_common::traits::{ChatPlatform, CreateSubscription, TwitchApi};

use crate::Error;

#[derive(Default)]
struct TwitchState {
    users: HashMap<String, TwitchUser>,
    subscriptions: Vec<UpstreamSubscription>,
    created: Vec<CreateSubscription>,
    deleted: Vec<String>,
    failing_kinds: HashSet<String>,
    token_users: HashMap<String, TwitchUser>,
    next_id: u64,
}

/// Twitch API fake that keeps subscriptions in memory.
#[derive(Default)]
pub struct FakeTwitchApi {
    state: Mutex<TwitchState>,
    create_delay: Option<Duration>,
}

impl FakeTwitchApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each create call sleeps this long before answering.
    pub fn with_create_delay(delay: Duration) -> Self {
        Self {
            create_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn add_user(&self, id: &str, login: &str) {
        let user = TwitchUser {
            id: id.to_string(),
            login: login.to_lowercase(),
            display_name: login.to_string(),
        };
        self.state.lock().users.insert(id.to_string(), user);
    }

    /// Registers the user returned for an OAuth code (the code doubles as the token).
    pub fn add_token_user(&self, code: &str, id: &str, login: &str) {
        let user = TwitchUser {
            id: id.to_string(),
            login: login.to_lowercase(),
            display_name: login.to_string(),
        };
        self.state.lock().token_users.insert(code.to_string(), user);
    }

    pub fn fail_creates_for(&self, kind: &str) {
        self.state.lock().failing_kinds.insert(kind.to_string());
    }

    pub fn push_subscription(&self, id: &str, kind: &str, status: &str, broadcaster: &str) {
        self.state.lock().subscriptions.push(UpstreamSubscription {
            id: id.to_string(),
            status: status.to_string(),
            kind: kind.to_string(),
            broadcaster_user_id: Some(broadcaster.to_string()),
        });
    }

    pub fn created(&self) -> Vec<CreateSubscription> {
        self.state.lock().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    pub fn live_subscriptions(&self) -> Vec<UpstreamSubscription> {
        self.state.lock().subscriptions.clone()
    }
}

#[async_trait]
impl TwitchApi for FakeTwitchApi {
    async fn get_users(&self, ids: &[String], logins: &[String]) -> Result<Vec<TwitchUser>, Error> {
        let state = self.state.lock();
        Ok(state
            .users
            .values()
            .filter(|u| ids.contains(&u.id) || logins.iter().any(|l| l.to_lowercase() == u.login))
            .cloned()
            .collect())
    }

    async fn get_token_user(&self, access_token: &str) -> Result<Option<TwitchUser>, Error> {
        Ok(self.state.lock().token_users.get(access_token).cloned())
    }

    async fn exchange_code(&self, code: &str) -> Result<UserAccessToken, Error> {
        if !self.state.lock().token_users.contains_key(code) {
            return Err(Error::Auth("invalid authorization code".into()));
        }
        Ok(UserAccessToken {
            access_token: code.to_string(),
            refresh_token: None,
            expires_in: 3600,
            scope: vec!["channel:moderate".into(), "moderation:read".into()],
        })
    }

    async fn create_subscription(&self, request: &CreateSubscription) -> Result<String, Error> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.created.push(request.clone());
        if state.failing_kinds.contains(&request.kind) {
            return Err(Error::Upstream {
                status: 500,
                body: format!("cannot create {}", request.kind),
            });
        }
        state.next_id += 1;
        let id = format!("sub-{}", state.next_id);
        state.subscriptions.push(UpstreamSubscription {
            id: id.clone(),
            status: UpstreamSubscription::ENABLED.to_string(),
            kind: request.kind.clone(),
            broadcaster_user_id: Some(request.condition.broadcaster_user_id.clone()),
        });
        Ok(id)
    }

    async fn list_subscriptions(&self) -> Result<Vec<UpstreamSubscription>, Error> {
        Ok(self.state.lock().subscriptions.clone())
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), Error> {
        let mut state = self.state.lock();
        state.deleted.push(subscription_id.to_string());
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.id != subscription_id);
        if state.subscriptions.len() == before {
            return Err(Error::Upstream {
                status: 404,
                body: format!("subscription {subscription_id} not found"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SentPayload {
    Text(String),
    Embed(ModerationEmbed),
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel_id: String,
    pub payload: SentPayload,
    pub at: Instant,
}

#[derive(Default)]
struct ChatState {
    sent: Vec<SentMessage>,
    left_guilds: HashSet<String>,
    dead_channels: HashSet<String>,
}

/// Chat platform fake: member of every guild unless told otherwise.
#[derive(Default)]
pub struct FakeChatPlatform {
    state: Mutex<ChatState>,
}

impl FakeChatPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leave_guild(&self, guild_id: &str) {
        self.state.lock().left_guilds.insert(guild_id.to_string());
    }

    /// Sends to this channel fail as if it was deleted.
    pub fn kill_channel(&self, channel_id: &str) {
        self.state.lock().dead_channels.insert(channel_id.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    pub fn sent_to(&self, channel_id: &str) -> Vec<SentMessage> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect()
    }

    fn record(&self, channel_id: &str, payload: SentPayload) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.dead_channels.contains(channel_id) {
            return Err(Error::DestinationUnavailable(format!("unknown channel {channel_id}")));
        }
        state.sent.push(SentMessage {
            channel_id: channel_id.to_string(),
            payload,
            at: Instant::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for FakeChatPlatform {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), Error> {
        self.record(channel_id, SentPayload::Text(content.to_string()))
    }

    async fn send_embed(&self, channel_id: &str, embed: &ModerationEmbed) -> Result<(), Error> {
        self.record(channel_id, SentPayload::Embed(embed.clone()))
    }

    async fn is_guild_member(&self, guild_id: &str) -> Result<bool, Error> {
        Ok(!self.state.lock().left_guilds.contains(guild_id))
    }
}
