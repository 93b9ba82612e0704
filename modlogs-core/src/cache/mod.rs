// File: modlogs-core/src/cache/mod.rs

pub mod redis_store;

pub use redis_store::RedisStore;

/// Key layout shared by every cache store implementation.
pub mod keys {
    use modlogs_common::models::ModerationAction;

    pub const SECRET_FIELD: &str = "secret";
    pub const SUBSCRIPTION_FIELD: &str = "id";

    pub const STREAMER_HOOKS_PREFIX: &str = "streamers:";

    pub fn streamer_hooks(streamer_id: &str) -> String {
        format!("{STREAMER_HOOKS_PREFIX}{streamer_id}")
    }

    /// Inverse of [`streamer_hooks`].
    pub fn streamer_from_hooks_key(key: &str) -> Option<&str> {
        key.strip_prefix(STREAMER_HOOKS_PREFIX).filter(|id| !id.is_empty())
    }

    pub fn webhook_secret(action: ModerationAction, streamer_id: &str) -> String {
        format!("webhook:twitch:{}:{streamer_id}", action.event_type())
    }

    pub fn delivery(event_type: &str, streamer_id: &str, message_id: &str) -> String {
        format!("twitch:events:{event_type}:{streamer_id}:{message_id}")
    }

    pub fn ignored_users(guild_id: &str) -> String {
        format!("ignored-users:{guild_id}")
    }

    pub fn auth_code(code: &str) -> String {
        format!("temp:codes:{code}")
    }
}
