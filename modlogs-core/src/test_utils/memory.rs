// File: modlogs-core/src/test_utils/memory.rs
//
// In-memory stand-ins for the Postgres repositories and the Redis store.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use modlogs_common::models::{Hook, HookMode, ModerationAction, TwitchUser, WebhookSecret};
use modlogs_common::traits::{CacheStore, ClaimOutcome, HookRepository, UserRepository};

use crate::Error;
use crate::cache::keys;

#[derive(Default)]
pub struct MemoryHookRepository {
    hooks: Mutex<Vec<Hook>>,
}

impl MemoryHookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Hook> {
        self.hooks.lock().clone()
    }
}

fn same_key(h: &Hook, guild_id: &str, channel_id: &str, streamer_id: &str) -> bool {
    h.guild_id == guild_id && h.channel_id == channel_id && h.streamer_id == streamer_id
}

#[async_trait]
impl HookRepository for MemoryHookRepository {
    async fn insert_hook(&self, hook: &Hook) -> Result<bool, Error> {
        let mut hooks = self.hooks.lock();
        if hooks
            .iter()
            .any(|h| same_key(h, &hook.guild_id, &hook.channel_id, &hook.streamer_id))
        {
            return Ok(false);
        }
        hooks.push(hook.clone());
        Ok(true)
    }

    async fn update_mode(
        &self,
        guild_id: &str,
        channel_id: &str,
        streamer_id: &str,
        mode: HookMode,
    ) -> Result<bool, Error> {
        let mut hooks = self.hooks.lock();
        match hooks
            .iter_mut()
            .find(|h| same_key(h, guild_id, channel_id, streamer_id))
        {
            Some(h) => {
                h.mode = mode;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_hook(
        &self,
        guild_id: &str,
        channel_id: &str,
        streamer_id: &str,
    ) -> Result<Option<Hook>, Error> {
        Ok(self
            .hooks
            .lock()
            .iter()
            .find(|h| same_key(h, guild_id, channel_id, streamer_id))
            .cloned())
    }

    async fn list_for_streamer(&self, streamer_id: &str) -> Result<Vec<Hook>, Error> {
        Ok(self
            .hooks
            .lock()
            .iter()
            .filter(|h| h.streamer_id == streamer_id)
            .cloned()
            .collect())
    }

    async fn list_for_guild(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
    ) -> Result<Vec<Hook>, Error> {
        Ok(self
            .hooks
            .lock()
            .iter()
            .filter(|h| h.guild_id == guild_id)
            .filter(|h| channel_id.is_none_or(|c| h.channel_id == c))
            .cloned()
            .collect())
    }

    async fn count_for_guild(&self, guild_id: &str) -> Result<i64, Error> {
        Ok(self.hooks.lock().iter().filter(|h| h.guild_id == guild_id).count() as i64)
    }

    async fn count_for_streamer(&self, streamer_id: &str) -> Result<i64, Error> {
        Ok(self
            .hooks
            .lock()
            .iter()
            .filter(|h| h.streamer_id == streamer_id)
            .count() as i64)
    }

    async fn delete_hook(
        &self,
        guild_id: &str,
        channel_id: &str,
        streamer_id: &str,
    ) -> Result<u64, Error> {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|h| !same_key(h, guild_id, channel_id, streamer_id));
        Ok((before - hooks.len()) as u64)
    }

    async fn delete_for_guild_streamer(
        &self,
        guild_id: &str,
        streamer_id: &str,
        channel_id: Option<&str>,
    ) -> Result<u64, Error> {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|h| {
            !(h.guild_id == guild_id
                && h.streamer_id == streamer_id
                && channel_id.is_none_or(|c| h.channel_id == c))
        });
        Ok((before - hooks.len()) as u64)
    }

    async fn delete_for_streamer(&self, streamer_id: &str) -> Result<u64, Error> {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|h| h.streamer_id != streamer_id);
        Ok((before - hooks.len()) as u64)
    }

    async fn list_streamer_ids(&self) -> Result<Vec<String>, Error> {
        let ids: BTreeSet<String> = self.hooks.lock().iter().map(|h| h.streamer_id.clone()).collect();
        Ok(ids.into_iter().collect())
    }
}

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<String, TwitchUser>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn upsert_user(&self, user: &TwitchUser) -> Result<(), Error> {
        let mut users = self.users.lock();
        users.retain(|id, u| !(u.login == user.login && *id != user.id));
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<TwitchUser>, Error> {
        Ok(self.users.lock().get(id).cloned())
    }

    async fn find_by_id_or_login(&self, needle: &str) -> Result<Option<TwitchUser>, Error> {
        let login = needle.to_lowercase();
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.id == needle || u.login == login)
            .cloned())
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<TwitchUser>, Error> {
        let users = self.users.lock();
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }
}

#[derive(Default)]
struct CacheState {
    counters: HashMap<String, i64>,
    claims: HashMap<String, Instant>,
    secrets: HashMap<String, WebhookSecret>,
    ignored: HashMap<String, BTreeSet<String>>,
    codes: HashMap<String, (String, Instant)>,
}

/// Single-process cache store; every method runs under one lock, which gives
/// the same atomicity as the Redis commands and scripts.
#[derive(Default)]
pub struct MemoryCacheStore {
    state: Mutex<CacheState>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_key(&self, key: &str) -> bool {
        let state = self.state.lock();
        state.claims.get(key).is_some_and(|exp| *exp > Instant::now())
    }

    pub fn counter(&self, streamer_id: &str) -> i64 {
        let state = self.state.lock();
        state
            .counters
            .get(&keys::streamer_hooks(streamer_id))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn incr_streamer_hooks(&self, streamer_id: &str, by: i64) -> Result<i64, Error> {
        let mut state = self.state.lock();
        let value = state.counters.entry(keys::streamer_hooks(streamer_id)).or_insert(0);
        *value += by;
        Ok(*value)
    }

    async fn decr_streamer_hooks(&self, streamer_id: &str, by: i64) -> Result<i64, Error> {
        let mut state = self.state.lock();
        let key = keys::streamer_hooks(streamer_id);
        let value = state.counters.get(&key).copied().unwrap_or(0) - by;
        if value <= 0 {
            state.counters.remove(&key);
        } else {
            state.counters.insert(key, value);
        }
        Ok(value)
    }

    async fn set_streamer_hooks(&self, streamer_id: &str, count: i64) -> Result<(), Error> {
        let mut state = self.state.lock();
        let key = keys::streamer_hooks(streamer_id);
        if count <= 0 {
            state.counters.remove(&key);
        } else {
            state.counters.insert(key, count);
        }
        Ok(())
    }

    async fn get_streamer_hooks(&self, streamer_id: &str) -> Result<i64, Error> {
        Ok(self.counter(streamer_id))
    }

    async fn list_counted_streamers(&self) -> Result<Vec<String>, Error> {
        let state = self.state.lock();
        let ids: BTreeSet<String> = state
            .counters
            .keys()
            .filter_map(|key| keys::streamer_from_hooks_key(key))
            .map(str::to_string)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn claim_key(&self, key: &str, ttl: Duration) -> Result<ClaimOutcome, Error> {
        let mut state = self.state.lock();
        let now = Instant::now();
        if state.claims.get(key).is_some_and(|exp| *exp > now) {
            return Ok(ClaimOutcome::AlreadyPresent);
        }
        state.claims.insert(key.to_string(), now + ttl);
        Ok(ClaimOutcome::Claimed)
    }

    async fn release_key(&self, key: &str) -> Result<(), Error> {
        self.state.lock().claims.remove(key);
        Ok(())
    }

    async fn get_webhook_secret(
        &self,
        action: ModerationAction,
        streamer_id: &str,
    ) -> Result<Option<WebhookSecret>, Error> {
        let state = self.state.lock();
        Ok(state.secrets.get(&keys::webhook_secret(action, streamer_id)).cloned())
    }

    async fn put_webhook_secret(
        &self,
        action: ModerationAction,
        streamer_id: &str,
        secret: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        let entry = state
            .secrets
            .entry(keys::webhook_secret(action, streamer_id))
            .or_insert_with(|| WebhookSecret {
                secret: String::new(),
                subscription_id: None,
            });
        entry.secret = secret.to_string();
        Ok(())
    }

    async fn set_subscription_id(
        &self,
        action: ModerationAction,
        streamer_id: &str,
        subscription_id: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        if let Some(entry) = state.secrets.get_mut(&keys::webhook_secret(action, streamer_id)) {
            entry.subscription_id = Some(subscription_id.to_string());
        }
        Ok(())
    }

    async fn delete_webhook_secret(
        &self,
        action: ModerationAction,
        streamer_id: &str,
    ) -> Result<(), Error> {
        self.state
            .lock()
            .secrets
            .remove(&keys::webhook_secret(action, streamer_id));
        Ok(())
    }

    async fn add_ignored_user(&self, guild_id: &str, user_id: &str) -> Result<bool, Error> {
        let mut state = self.state.lock();
        Ok(state
            .ignored
            .entry(guild_id.to_string())
            .or_default()
            .insert(user_id.to_string()))
    }

    async fn remove_ignored_user(&self, guild_id: &str, user_id: &str) -> Result<bool, Error> {
        let mut state = self.state.lock();
        Ok(state
            .ignored
            .get_mut(guild_id)
            .is_some_and(|set| set.remove(user_id)))
    }

    async fn is_user_ignored(&self, guild_id: &str, user_id: &str) -> Result<bool, Error> {
        let state = self.state.lock();
        Ok(state.ignored.get(guild_id).is_some_and(|set| set.contains(user_id)))
    }

    async fn list_ignored_users(&self, guild_id: &str) -> Result<Vec<String>, Error> {
        let state = self.state.lock();
        Ok(state
            .ignored
            .get(guild_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn store_auth_code(&self, code: &str, user_id: &str, ttl: Duration) -> Result<(), Error> {
        let mut state = self.state.lock();
        state
            .codes
            .insert(code.to_string(), (user_id.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn consume_auth_code(&self, code: &str) -> Result<Option<String>, Error> {
        let mut state = self.state.lock();
        Ok(state
            .codes
            .remove(code)
            .filter(|(_, exp)| *exp > Instant::now())
            .map(|(user_id, _)| user_id))
    }
}
