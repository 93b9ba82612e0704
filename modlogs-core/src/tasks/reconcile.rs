// File: modlogs-core/src/tasks/reconcile.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use futures_util::future::join_all;
use tracing::{error, info, warn};

use modlogs_common::models::{ModerationAction, UpstreamSubscription};
use modlogs_common::traits::{CacheStore, HookRepository, TwitchApi};

use crate::Error;
use crate::services::subscription_registry::SubscriptionRegistry;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Upstream subscriptions removed.
    pub deleted: usize,
    /// Streamers that needed at least one subscription recreated.
    pub repaired: Vec<String>,
    /// Streamers whose hooks were dropped because recreation failed.
    pub dropped: Vec<String>,
    /// Counters that disagreed with the hook rows and were rewritten.
    pub counters_rewritten: usize,
}

/// Brings upstream subscriptions back in line with local hook rows.
///
/// Subscriptions for streamers without hooks, in any status other than
/// `enabled`, of an unknown type, duplicated, or lacking a local secret are
/// deleted. Streamers with hooks get their missing types recreated; if that
/// fails their hooks are dropped, since delivery can no longer be promised.
/// Finally every streamer's hook counter is rewritten from the row count,
/// including counters left behind for streamers that no longer have rows.
pub async fn run_reconciliation(
    hooks: &dyn HookRepository,
    cache: &dyn CacheStore,
    twitch: &dyn TwitchApi,
    registry: &SubscriptionRegistry,
) -> Result<ReconcileReport, Error> {
    let streamers: HashSet<String> = hooks.list_streamer_ids().await?.into_iter().collect();
    let counted: BTreeSet<String> = cache.list_counted_streamers().await?.into_iter().collect();
    let upstream = twitch.list_subscriptions().await?;
    info!(
        streamers = streamers.len(),
        subscriptions = upstream.len(),
        "Reconciling event subscriptions"
    );

    let mut active: HashMap<String, HashSet<ModerationAction>> = HashMap::new();
    let mut stale: Vec<UpstreamSubscription> = Vec::new();

    for sub in upstream {
        let Some(keep) = classify(&sub, &streamers, cache).await else {
            stale.push(sub);
            continue;
        };
        let (streamer, action) = keep;
        if !active.entry(streamer.clone()).or_default().insert(action) {
            stale.push(sub);
            continue;
        }
        let recorded = cache.get_webhook_secret(action, &streamer).await?;
        if recorded.and_then(|r| r.subscription_id).as_deref() != Some(sub.id.as_str()) {
            cache.set_subscription_id(action, &streamer, &sub.id).await?;
        }
    }

    let mut report = ReconcileReport::default();
    let deletions = join_all(stale.iter().map(|s| twitch.delete_subscription(&s.id))).await;
    for (sub, result) in stale.iter().zip(deletions) {
        match result {
            Ok(()) => report.deleted += 1,
            Err(e) => warn!(subscription = %sub.id, kind = %sub.kind, error = %e, "Failed to delete stale subscription"),
        }
    }

    let mut sorted: Vec<&String> = streamers.iter().collect();
    sorted.sort();
    for streamer in sorted {
        let present = active.get(streamer.as_str());
        let missing: Vec<ModerationAction> = ModerationAction::ALL
            .into_iter()
            .filter(|a| !present.is_some_and(|p| p.contains(a)))
            .collect();

        if !missing.is_empty() {
            report.repaired.push(streamer.clone());
            if let Err(e) = registry.create_subscriptions(streamer, &missing).await {
                error!(streamer = %streamer, error = %e, "Could not recreate subscriptions; dropping hooks");
                drop_streamer(hooks, cache, registry, streamer).await;
                report.dropped.push(streamer.clone());
                continue;
            }
        }

        let count = hooks.count_for_streamer(streamer).await?;
        if rewrite_counter(cache, streamer, count).await? {
            report.counters_rewritten += 1;
        }
    }

    for orphan in counted.iter().filter(|s| !streamers.contains(*s)) {
        if rewrite_counter(cache, orphan, 0).await? {
            report.counters_rewritten += 1;
        }
    }

    info!(
        deleted = report.deleted,
        repaired = report.repaired.len(),
        dropped = report.dropped.len(),
        counters_rewritten = report.counters_rewritten,
        "Reconciliation finished"
    );
    Ok(report)
}

/// Sets the counter to `rows` when it disagrees. Returns whether it did.
async fn rewrite_counter(cache: &dyn CacheStore, streamer: &str, rows: i64) -> Result<bool, Error> {
    let current = cache.get_streamer_hooks(streamer).await?;
    if current == rows {
        return Ok(false);
    }
    warn!(streamer = %streamer, counter = current, rows, "Hook counter drifted from hook rows");
    cache.set_streamer_hooks(streamer, rows).await?;
    Ok(true)
}

/// `Some((streamer, action))` for a subscription worth keeping.
async fn classify(
    sub: &UpstreamSubscription,
    streamers: &HashSet<String>,
    cache: &dyn CacheStore,
) -> Option<(String, ModerationAction)> {
    if !sub.is_enabled() {
        return None;
    }
    let streamer = sub.broadcaster_user_id.as_ref().filter(|s| streamers.contains(*s))?;
    let action: ModerationAction = sub.kind.parse().ok()?;
    match cache.get_webhook_secret(action, streamer).await {
        Ok(Some(record)) if !record.secret.is_empty() => Some((streamer.clone(), action)),
        Ok(_) => None,
        Err(e) => {
            // Keep it; a store hiccup should not tear down live subscriptions.
            warn!(streamer = %streamer, error = %e, "Secret lookup failed during reconciliation");
            Some((streamer.clone(), action))
        }
    }
}

async fn drop_streamer(
    hooks: &dyn HookRepository,
    cache: &dyn CacheStore,
    registry: &SubscriptionRegistry,
    streamer: &str,
) {
    match hooks.delete_for_streamer(streamer).await {
        Ok(removed) => warn!(streamer = %streamer, removed, "Dropped hooks for streamer"),
        Err(e) => error!(streamer = %streamer, error = %e, "Failed to drop hooks"),
    }
    if let Err(e) = cache.set_streamer_hooks(streamer, 0).await {
        error!(streamer = %streamer, error = %e, "Failed to reset hook counter");
    }
    if let Err(e) = registry.revoke_subscriptions(streamer).await {
        error!(streamer = %streamer, error = %e, "Failed to revoke remaining subscriptions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use modlogs_common::models::{Hook, HookMode};

    use crate::test_utils::{FakeTwitchApi, MemoryCacheStore, MemoryHookRepository};

    struct Fixture {
        hooks: Arc<MemoryHookRepository>,
        cache: Arc<MemoryCacheStore>,
        twitch: Arc<FakeTwitchApi>,
        registry: SubscriptionRegistry,
    }

    fn fixture() -> Fixture {
        let hooks = Arc::new(MemoryHookRepository::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let twitch = Arc::new(FakeTwitchApi::new());
        let registry = SubscriptionRegistry::new(hooks.clone(), cache.clone(), twitch.clone(), "https://modlogs.example");
        Fixture {
            hooks,
            cache,
            twitch,
            registry,
        }
    }

    async fn run(f: &Fixture) -> ReconcileReport {
        run_reconciliation(f.hooks.as_ref(), f.cache.as_ref(), f.twitch.as_ref(), &f.registry)
            .await
            .unwrap()
    }

    async fn add_hook(f: &Fixture, channel: &str, streamer: &str) {
        f.hooks
            .insert_hook(&Hook {
                guild_id: "g1".into(),
                channel_id: channel.into(),
                streamer_id: streamer.into(),
                mode: HookMode::Embed,
            })
            .await
            .unwrap();
    }

    async fn seed_secret(f: &Fixture, action: ModerationAction, streamer: &str) {
        f.cache.put_webhook_secret(action, streamer, "secret").await.unwrap();
    }

    #[tokio::test]
    async fn test_deletes_subscriptions_of_unknown_streamers() {
        let f = fixture();
        f.twitch.push_subscription("s1", "channel.ban", "enabled", "999");
        f.twitch.push_subscription("s2", "channel.unban", "webhook_callback_verification_failed", "999");

        let report = run(&f).await;
        assert_eq!(report.deleted, 2);
        assert!(f.twitch.live_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_recreates_missing_types_and_fixes_counter() {
        let f = fixture();
        add_hook(&f, "c1", "42").await;
        add_hook(&f, "c2", "42").await;
        seed_secret(&f, ModerationAction::Ban, "42").await;
        f.twitch.push_subscription("s1", "channel.ban", "enabled", "42");
        f.twitch.push_subscription("s1-dup", "channel.ban", "enabled", "42");

        let report = run(&f).await;
        assert_eq!(report.deleted, 1);
        assert_eq!(report.repaired, vec!["42".to_string()]);
        let created: Vec<String> = f.twitch.created().into_iter().map(|c| c.kind).collect();
        assert_eq!(created.len(), 3);
        assert!(!created.contains(&"channel.ban".to_string()));
        assert_eq!(f.cache.counter("42"), 2);

        let ban = f
            .cache
            .get_webhook_secret(ModerationAction::Ban, "42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ban.subscription_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_subscription_without_local_secret_is_replaced() {
        let f = fixture();
        add_hook(&f, "c1", "42").await;
        f.twitch.push_subscription("orphan", "channel.unban", "enabled", "42");

        let report = run(&f).await;
        assert_eq!(report.deleted, 1);
        assert_eq!(f.twitch.deleted(), vec!["orphan".to_string()]);
        assert_eq!(f.twitch.created().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_recreation_drops_hooks() {
        let f = fixture();
        add_hook(&f, "c1", "42").await;
        f.twitch.fail_creates_for("channel.moderator.add");

        let report = run(&f).await;
        assert_eq!(report.dropped, vec!["42".to_string()]);
        assert!(f.hooks.all().is_empty());
        assert_eq!(f.cache.counter("42"), 0);
    }

    #[tokio::test]
    async fn test_counter_without_hook_rows_is_reset() {
        let f = fixture();
        f.cache.incr_streamer_hooks("99", 3).await.unwrap();

        let report = run(&f).await;
        assert_eq!(report.counters_rewritten, 1);
        assert_eq!(f.cache.counter("99"), 0);

        let hook = Hook {
            guild_id: "g1".into(),
            channel_id: "c1".into(),
            streamer_id: "99".into(),
            mode: HookMode::Minimal,
        };
        f.registry.register_hook(&hook).await.unwrap();
        assert_eq!(f.cache.counter("99"), 1);
        assert_eq!(f.twitch.created().len(), 4);
    }

    #[tokio::test]
    async fn test_matching_counters_are_left_alone() {
        let f = fixture();
        add_hook(&f, "c1", "42").await;
        f.cache.incr_streamer_hooks("42", 1).await.unwrap();
        for action in ModerationAction::ALL {
            seed_secret(&f, action, "42").await;
            f.twitch.push_subscription(&format!("s-{action}"), action.event_type(), "enabled", "42");
        }

        let report = run(&f).await;
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(f.cache.counter("42"), 1);
    }
}
