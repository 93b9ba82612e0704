// File: modlogs-common/src/traits/store_traits.rs

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;
use crate::models::{ModerationAction, WebhookSecret};

/// Result of a set-if-absent on an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyPresent,
}

/// The shared cache/lock store. Every operation is a single atomic step on
/// the store side.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Adds `by` to the streamer's hook counter and returns the new value.
    async fn incr_streamer_hooks(&self, streamer_id: &str, by: i64) -> Result<i64, Error>;

    /// Subtracts `by` from the counter, dropping the key once it reaches
    /// zero or below. Returns the value after the decrement.
    async fn decr_streamer_hooks(&self, streamer_id: &str, by: i64) -> Result<i64, Error>;

    /// Overwrites the counter; a count of zero removes it.
    async fn set_streamer_hooks(&self, streamer_id: &str, count: i64) -> Result<(), Error>;

    async fn get_streamer_hooks(&self, streamer_id: &str) -> Result<i64, Error>;

    /// Every streamer that currently has a hook counter.
    async fn list_counted_streamers(&self) -> Result<Vec<String>, Error>;

    async fn claim_key(&self, key: &str, ttl: Duration) -> Result<ClaimOutcome, Error>;

    async fn release_key(&self, key: &str) -> Result<(), Error>;

    async fn get_webhook_secret(
        &self,
        action: ModerationAction,
        streamer_id: &str,
    ) -> Result<Option<WebhookSecret>, Error>;

    async fn put_webhook_secret(
        &self,
        action: ModerationAction,
        streamer_id: &str,
        secret: &str,
    ) -> Result<(), Error>;

    async fn set_subscription_id(
        &self,
        action: ModerationAction,
        streamer_id: &str,
        subscription_id: &str,
    ) -> Result<(), Error>;

    async fn delete_webhook_secret(
        &self,
        action: ModerationAction,
        streamer_id: &str,
    ) -> Result<(), Error>;

    /// Returns `true` when the user was not already ignored.
    async fn add_ignored_user(&self, guild_id: &str, user_id: &str) -> Result<bool, Error>;

    /// Returns `true` when the user was on the list.
    async fn remove_ignored_user(&self, guild_id: &str, user_id: &str) -> Result<bool, Error>;

    async fn is_user_ignored(&self, guild_id: &str, user_id: &str) -> Result<bool, Error>;

    async fn list_ignored_users(&self, guild_id: &str) -> Result<Vec<String>, Error>;

    async fn store_auth_code(&self, code: &str, user_id: &str, ttl: Duration) -> Result<(), Error>;

    /// Reads and deletes the code in one step; a code can be used once.
    async fn consume_auth_code(&self, code: &str) -> Result<Option<String>, Error>;
}
