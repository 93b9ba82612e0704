// File: modlogs-core/src/services/subscription_registry.rs

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use modlogs_common::error::AggregateError;
use modlogs_common::models::{Hook, HookUpsert, ModerationAction};
use modlogs_common::traits::{CacheStore, CreateSubscription, HookRepository, TwitchApi};

use crate::Error;
use crate::utils::random::random_token;

/// Size in bytes of the shared webhook secret before encoding.
pub const SECRET_BYTES: usize = 64;

/// Keeps upstream subscriptions in step with local hook rows. The first hook
/// of a streamer subscribes to every moderation event type; removing the last
/// one revokes them.
pub struct SubscriptionRegistry {
    hooks: Arc<dyn HookRepository>,
    cache: Arc<dyn CacheStore>,
    twitch: Arc<dyn TwitchApi>,
    callback_base: String,
}

impl SubscriptionRegistry {
    pub fn new(
        hooks: Arc<dyn HookRepository>,
        cache: Arc<dyn CacheStore>,
        twitch: Arc<dyn TwitchApi>,
        callback_base: impl Into<String>,
    ) -> Self {
        Self {
            hooks,
            cache,
            twitch,
            callback_base: callback_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn callback_url(&self, action: ModerationAction, streamer_id: &str) -> String {
        format!("{}/webhook/{}/{}", self.callback_base, action.event_type(), streamer_id)
    }

    /// Stores the hook. An existing row only gets its mode updated; a new one
    /// bumps the streamer's counter and, as the first hook, subscribes.
    /// Any failure after the insert undoes it.
    pub async fn register_hook(&self, hook: &Hook) -> Result<HookUpsert, Error> {
        if !self.hooks.insert_hook(hook).await? {
            self.hooks
                .update_mode(&hook.guild_id, &hook.channel_id, &hook.streamer_id, hook.mode)
                .await?;
            return Ok(HookUpsert::Updated);
        }

        let count = match self.cache.incr_streamer_hooks(&hook.streamer_id, 1).await {
            Ok(count) => count,
            Err(e) => {
                self.delete_row_quietly(hook).await;
                return Err(e);
            }
        };
        debug!(streamer = %hook.streamer_id, count, "Incremented streamer hook counter");

        if count == 1 {
            if let Err(e) = self
                .create_subscriptions(&hook.streamer_id, &ModerationAction::ALL)
                .await
            {
                error!(streamer = %hook.streamer_id, error = %e, "Failed to create subscriptions; rolling back hook");
                self.delete_row_quietly(hook).await;
                if let Err(release_err) = self.release_streamer(&hook.streamer_id, 1).await {
                    error!(streamer = %hook.streamer_id, error = %release_err, "Rollback of streamer counter failed");
                }
                return Err(e);
            }
            info!(streamer = %hook.streamer_id, "Subscribed to moderation events");
        }
        Ok(HookUpsert::Created)
    }

    /// Removes the guild's hooks for a streamer (optionally one channel).
    /// Returns how many rows went away.
    pub async fn unregister_hooks(
        &self,
        guild_id: &str,
        streamer_id: &str,
        channel_id: Option<&str>,
    ) -> Result<u64, Error> {
        let removed = self
            .hooks
            .delete_for_guild_streamer(guild_id, streamer_id, channel_id)
            .await?;
        if removed > 0 {
            self.release_streamer(streamer_id, removed).await?;
        }
        Ok(removed)
    }

    /// Drops a single hook whose destination can no longer be served.
    pub async fn evict_hook(&self, hook: &Hook) -> Result<bool, Error> {
        let removed = self
            .hooks
            .delete_hook(&hook.guild_id, &hook.channel_id, &hook.streamer_id)
            .await?;
        if removed == 0 {
            return Ok(false);
        }
        info!(
            guild = %hook.guild_id,
            channel = %hook.channel_id,
            streamer = %hook.streamer_id,
            "Evicted hook"
        );
        self.release_streamer(&hook.streamer_id, removed).await?;
        Ok(true)
    }

    /// Decrements the counter by `removed` and revokes once no hook rows
    /// remain. A counter at or below zero while rows still exist has drifted
    /// and is reset to the row count instead.
    async fn release_streamer(&self, streamer_id: &str, removed: u64) -> Result<(), Error> {
        let by = i64::try_from(removed).unwrap_or(i64::MAX);
        let remaining = self.cache.decr_streamer_hooks(streamer_id, by).await?;
        debug!(streamer = %streamer_id, remaining, "Decremented streamer hook counter");
        if remaining > 0 {
            return Ok(());
        }

        let rows = self.hooks.count_for_streamer(streamer_id).await?;
        if rows > 0 {
            warn!(streamer = %streamer_id, counter = remaining, rows, "Hook counter drifted; keeping subscriptions");
            self.cache.set_streamer_hooks(streamer_id, rows).await?;
            return Ok(());
        }

        self.revoke_subscriptions(streamer_id).await?;
        info!(streamer = %streamer_id, "Revoked moderation event subscriptions");
        Ok(())
    }

    async fn delete_row_quietly(&self, hook: &Hook) {
        if let Err(e) = self
            .hooks
            .delete_hook(&hook.guild_id, &hook.channel_id, &hook.streamer_id)
            .await
        {
            error!(guild = %hook.guild_id, streamer = %hook.streamer_id, error = %e, "Failed to delete hook row");
        }
    }

    /// Subscribes `streamer_id` to `actions`, sharing one fresh secret.
    /// Secrets are stored before any request goes out so the verification
    /// challenge can always be checked, and each returned subscription id is
    /// stored as soon as it is known. Every failed request is reported.
    pub async fn create_subscriptions(
        &self,
        streamer_id: &str,
        actions: &[ModerationAction],
    ) -> Result<(), Error> {
        let secret = random_token(SECRET_BYTES);
        for action in actions {
            self.cache.put_webhook_secret(*action, streamer_id, &secret).await?;
        }

        let requests: Vec<CreateSubscription> = actions
            .iter()
            .map(|a| CreateSubscription::webhook(*a, streamer_id, self.callback_url(*a, streamer_id), &secret))
            .collect();
        let results = join_all(requests.iter().map(|r| self.twitch.create_subscription(r))).await;

        let mut errors = AggregateError::default();
        for ((action, request), result) in actions.iter().zip(&requests).zip(results) {
            match result {
                Ok(id) => {
                    if let Err(e) = self.cache.set_subscription_id(*action, streamer_id, &id).await {
                        errors.push(e);
                    }
                }
                Err(e) => {
                    warn!(kind = %request.kind, streamer = %streamer_id, error = %e, "Subscription request failed");
                    errors.push(e);
                }
            }
        }
        errors.into_result()
    }

    /// Deletes every stored subscription of the streamer. Types without a
    /// known subscription id only lose their local secret.
    pub async fn revoke_subscriptions(&self, streamer_id: &str) -> Result<(), Error> {
        let mut errors = AggregateError::default();
        let mut pending = Vec::new();

        for action in ModerationAction::ALL {
            match self.cache.get_webhook_secret(action, streamer_id).await {
                Ok(Some(record)) => match record.subscription_id {
                    Some(id) => pending.push((action, id)),
                    None => {
                        if let Err(e) = self.cache.delete_webhook_secret(action, streamer_id).await {
                            errors.push(e);
                        }
                    }
                },
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }

        let results = join_all(
            pending
                .iter()
                .map(|(_, id)| self.twitch.delete_subscription(id)),
        )
        .await;

        for ((action, id), result) in pending.iter().zip(results) {
            match result {
                Ok(()) => {
                    if let Err(e) = self.cache.delete_webhook_secret(*action, streamer_id).await {
                        errors.push(e);
                    }
                }
                Err(e) => {
                    warn!(subscription = %id, kind = %action, streamer = %streamer_id, error = %e, "Failed to revoke subscription");
                    errors.push(e);
                }
            }
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeTwitchApi, MemoryCacheStore, MemoryHookRepository};
    use modlogs_common::models::HookMode;

    struct Fixture {
        hooks: Arc<MemoryHookRepository>,
        cache: Arc<MemoryCacheStore>,
        twitch: Arc<FakeTwitchApi>,
        registry: Arc<SubscriptionRegistry>,
    }

    fn fixture_with(twitch: FakeTwitchApi) -> Fixture {
        let hooks = Arc::new(MemoryHookRepository::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let twitch = Arc::new(twitch);
        let registry = Arc::new(SubscriptionRegistry::new(
            hooks.clone(),
            cache.clone(),
            twitch.clone(),
            "https://modlogs.example/",
        ));
        Fixture { hooks, cache, twitch, registry }
    }

    fn hook(guild: &str, channel: &str) -> Hook {
        Hook {
            guild_id: guild.into(),
            channel_id: channel.into(),
            streamer_id: "1337".into(),
            mode: HookMode::Embed,
        }
    }

    #[tokio::test]
    async fn test_first_hook_subscribes_all_types() -> Result<(), Error> {
        let f = fixture_with(FakeTwitchApi::new());

        assert_eq!(f.registry.register_hook(&hook("g1", "c1")).await?, HookUpsert::Created);

        let created = f.twitch.created();
        assert_eq!(created.len(), 4);
        let secret = &created[0].transport.secret;
        assert!(created.iter().all(|c| &c.transport.secret == secret));
        assert!(created.iter().any(|c| c.transport.callback
            == "https://modlogs.example/webhook/channel.moderator.add/1337"));
        for action in ModerationAction::ALL {
            let stored = f.cache.get_webhook_secret(action, "1337").await?.unwrap();
            assert_eq!(&stored.secret, secret);
        }
        assert_eq!(f.cache.counter("1337"), 1);

        f.registry.register_hook(&hook("g2", "c2")).await?;
        assert_eq!(f.twitch.created().len(), 4);
        assert_eq!(f.cache.counter("1337"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_hook_only_updates_mode() -> Result<(), Error> {
        let f = fixture_with(FakeTwitchApi::new());
        f.registry.register_hook(&hook("g1", "c1")).await?;

        let mut minimal = hook("g1", "c1");
        minimal.mode = HookMode::Minimal;
        assert_eq!(f.registry.register_hook(&minimal).await?, HookUpsert::Updated);
        assert_eq!(f.cache.counter("1337"), 1);
        assert_eq!(f.hooks.all()[0].mode, HookMode::Minimal);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_subscription_rolls_back_hook() {
        let twitch = FakeTwitchApi::new();
        twitch.fail_creates_for("channel.unban");
        let f = fixture_with(twitch);

        let err = f.registry.register_hook(&hook("g1", "c1")).await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 500, .. }));
        assert!(f.hooks.all().is_empty());
        assert_eq!(f.cache.counter("1337"), 0);
        assert_eq!(f.twitch.deleted().len(), 3);
        assert!(f.twitch.live_subscriptions().is_empty());
        for action in ModerationAction::ALL {
            assert!(f.cache.get_webhook_secret(action, "1337").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_remove_before_verification_revokes_upstream() -> Result<(), Error> {
        let f = fixture_with(FakeTwitchApi::new());
        f.registry.register_hook(&hook("g1", "c1")).await?;
        for action in ModerationAction::ALL {
            let stored = f.cache.get_webhook_secret(action, "1337").await?.unwrap();
            assert!(stored.subscription_id.is_some());
        }

        assert_eq!(f.registry.unregister_hooks("g1", "1337", None).await?, 1);
        assert_eq!(f.twitch.deleted().len(), 4);
        assert!(f.twitch.live_subscriptions().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_drifted_counter_does_not_revoke_live_hooks() -> Result<(), Error> {
        let f = fixture_with(FakeTwitchApi::new());
        f.registry.register_hook(&hook("g1", "c1")).await?;
        f.registry.register_hook(&hook("g2", "c2")).await?;
        // Counter lost, e.g. the key expired or was flushed.
        f.cache.set_streamer_hooks("1337", 0).await?;

        assert!(f.registry.evict_hook(&hook("g1", "c1")).await?);
        assert!(f.twitch.deleted().is_empty());
        assert_eq!(f.twitch.live_subscriptions().len(), 4);
        assert_eq!(f.cache.counter("1337"), 1);

        assert!(f.registry.evict_hook(&hook("g2", "c2")).await?);
        assert_eq!(f.twitch.deleted().len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_first_hooks_subscribe_once() -> Result<(), Error> {
        let f = fixture_with(FakeTwitchApi::with_create_delay(std::time::Duration::from_millis(20)));

        let a = {
            let registry = f.registry.clone();
            tokio::spawn(async move { registry.register_hook(&hook("g1", "c1")).await })
        };
        let b = {
            let registry = f.registry.clone();
            tokio::spawn(async move { registry.register_hook(&hook("g2", "c2")).await })
        };
        a.await.unwrap()?;
        b.await.unwrap()?;

        assert_eq!(f.twitch.created().len(), 4);
        assert_eq!(f.cache.counter("1337"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_last_removal_revokes() -> Result<(), Error> {
        let f = fixture_with(FakeTwitchApi::new());
        f.registry.register_hook(&hook("g1", "c1")).await?;
        f.registry.register_hook(&hook("g1", "c2")).await?;
        f.registry.register_hook(&hook("g2", "c3")).await?;

        assert_eq!(f.registry.unregister_hooks("g1", "1337", None).await?, 2);
        assert_eq!(f.cache.counter("1337"), 1);
        assert!(f.twitch.deleted().is_empty());

        assert!(f.registry.evict_hook(&hook("g2", "c3")).await?);
        assert_eq!(f.cache.counter("1337"), 0);
        assert_eq!(f.twitch.deleted().len(), 4);
        assert!(f.twitch.live_subscriptions().is_empty());
        for action in ModerationAction::ALL {
            assert!(f.cache.get_webhook_secret(action, "1337").await?.is_none());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_revoke_collects_every_failure() -> Result<(), Error> {
        let f = fixture_with(FakeTwitchApi::new());
        for action in ModerationAction::ALL {
            f.cache.put_webhook_secret(action, "1337", "s").await?;
            f.cache.set_subscription_id(action, "1337", &format!("missing-{action}")).await?;
        }

        let err = f.registry.revoke_subscriptions("1337").await.unwrap_err();
        match err {
            Error::Aggregate(agg) => assert_eq!(agg.errors.len(), 4),
            other => panic!("expected aggregate error, got {other}"),
        }
        assert_eq!(f.twitch.deleted().len(), 4);
        Ok(())
    }
}
