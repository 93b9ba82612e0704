// File: modlogs-common/src/traits/repository_traits.rs

use async_trait::async_trait;

use crate::error::Error;
use crate::models::{Hook, HookMode, TwitchUser};

/// Persistent hook registrations, unique per (guild, channel, streamer).
#[async_trait]
pub trait HookRepository: Send + Sync {
    /// Inserts the hook unless a row with the same key exists.
    /// Returns `true` when a new row was written.
    async fn insert_hook(&self, hook: &Hook) -> Result<bool, Error>;

    async fn update_mode(
        &self,
        guild_id: &str,
        channel_id: &str,
        streamer_id: &str,
        mode: HookMode,
    ) -> Result<bool, Error>;

    async fn find_hook(
        &self,
        guild_id: &str,
        channel_id: &str,
        streamer_id: &str,
    ) -> Result<Option<Hook>, Error>;

    async fn list_for_streamer(&self, streamer_id: &str) -> Result<Vec<Hook>, Error>;

    async fn list_for_guild(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
    ) -> Result<Vec<Hook>, Error>;

    async fn count_for_guild(&self, guild_id: &str) -> Result<i64, Error>;

    async fn count_for_streamer(&self, streamer_id: &str) -> Result<i64, Error>;

    /// Returns the number of rows removed (0 or 1).
    async fn delete_hook(
        &self,
        guild_id: &str,
        channel_id: &str,
        streamer_id: &str,
    ) -> Result<u64, Error>;

    /// Removes every hook of `streamer_id` in the guild, optionally narrowed
    /// to one channel.
    async fn delete_for_guild_streamer(
        &self,
        guild_id: &str,
        streamer_id: &str,
        channel_id: Option<&str>,
    ) -> Result<u64, Error>;

    async fn delete_for_streamer(&self, streamer_id: &str) -> Result<u64, Error>;

    async fn list_streamer_ids(&self) -> Result<Vec<String>, Error>;
}

/// Cache of Twitch identities, keyed by id with a unique login.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn upsert_user(&self, user: &TwitchUser) -> Result<(), Error>;

    async fn find_by_id(&self, id: &str) -> Result<Option<TwitchUser>, Error>;

    /// Matches either the id or the (lowercased) login.
    async fn find_by_id_or_login(&self, needle: &str) -> Result<Option<TwitchUser>, Error>;

    async fn find_many(&self, ids: &[String]) -> Result<Vec<TwitchUser>, Error>;
}
