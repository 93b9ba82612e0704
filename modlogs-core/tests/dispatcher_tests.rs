// tests/dispatcher_tests.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use modlogs_common::models::{Hook, HookMode, ModerationAction, ModerationEvent};
use modlogs_common::traits::{CacheStore, HookRepository};
use modlogs_core::services::dispatcher::{DeliveryOutcome, DispatchJob};
use modlogs_core::services::rate_limiter::ChannelRateLimiter;
use modlogs_core::services::{DeduplicationGate, Dispatcher, HookResolver, SubscriptionRegistry};
use modlogs_core::test_utils::{
    FakeChatPlatform, FakeTwitchApi, MemoryCacheStore, MemoryHookRepository, SentMessage, SentPayload,
};

const STREAMER: &str = "1337";

struct Setup {
    dispatcher: Arc<Dispatcher>,
    registry: Arc<SubscriptionRegistry>,
    hooks: Arc<MemoryHookRepository>,
    cache: Arc<MemoryCacheStore>,
    chat: Arc<FakeChatPlatform>,
}

fn setup() -> Setup {
    let hooks = Arc::new(MemoryHookRepository::new());
    let cache = Arc::new(MemoryCacheStore::new());
    let twitch = Arc::new(FakeTwitchApi::new());
    let chat = Arc::new(FakeChatPlatform::new());
    let registry = Arc::new(SubscriptionRegistry::new(
        hooks.clone(),
        cache.clone(),
        twitch,
        "https://modlogs.example",
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        HookResolver::new(hooks.clone()),
        registry.clone(),
        cache.clone(),
        chat.clone(),
        Arc::new(ChannelRateLimiter::default()),
        DeduplicationGate::new(cache.clone()),
        "ModLogs",
    ));
    Setup {
        dispatcher,
        registry,
        hooks,
        cache,
        chat,
    }
}

async fn add_hook(s: &Setup, guild: &str, channel: &str, mode: HookMode) {
    s.registry
        .register_hook(&Hook {
            guild_id: guild.to_string(),
            channel_id: channel.to_string(),
            streamer_id: STREAMER.to_string(),
            mode,
        })
        .await
        .unwrap();
}

fn ban(target: &str, timeout_secs: Option<i64>) -> DispatchJob {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    DispatchJob {
        event: ModerationEvent {
            broadcaster_id: STREAMER.to_string(),
            broadcaster_name: "Streamer".to_string(),
            moderator_id: Some("77".to_string()),
            moderator_name: Some("ModName".to_string()),
            target_user_name: target.to_string(),
            reason: None,
            action: ModerationAction::Ban,
            expires_at: timeout_secs.map(|s| created_at + chrono::Duration::seconds(s)),
            created_at,
        },
        dedup_key: None,
    }
}

fn text(msg: &SentMessage) -> &str {
    match &msg.payload {
        SentPayload::Text(t) => t,
        SentPayload::Embed(_) => panic!("expected a text message"),
    }
}

/// No ten second window saw more than five sends.
fn assert_within_rate(sent: &[SentMessage]) {
    for pair in sent.windows(6) {
        assert!(
            pair[5].at.duration_since(pair[0].at) >= Duration::from_secs(10),
            "six sends inside one window"
        );
    }
}

#[tokio::test]
async fn test_timeout_renders_both_modes() {
    let s = setup();
    add_hook(&s, "g1", "embed-chan", HookMode::Embed).await;
    add_hook(&s, "g2", "text-chan", HookMode::Minimal).await;

    let report = s.dispatcher.dispatch(ban("troll", Some(600))).await.unwrap();
    assert_eq!(report.count(DeliveryOutcome::Sent), 2);

    let embeds = s.chat.sent_to("embed-chan");
    match &embeds[0].payload {
        SentPayload::Embed(embed) => {
            assert_eq!(embed.title, "User Timeout Event");
            assert_eq!(embed.footer, "ModLogs");
            assert!(embed.fields.iter().any(|f| f.name == "Expires"));
        }
        other => panic!("expected an embed, got {other:?}"),
    }

    let lines = s.chat.sent_to("text-chan");
    assert_eq!(
        text(&lines[0]),
        "**User Timeout Event: #Streamer** - `ModName` executed `/timeout troll 601`"
    );
}

#[tokio::test]
async fn test_dead_channel_is_evicted_others_still_served() {
    let s = setup();
    add_hook(&s, "g1", "gone", HookMode::Minimal).await;
    add_hook(&s, "g2", "alive", HookMode::Minimal).await;
    assert_eq!(s.cache.counter(STREAMER), 2);
    s.chat.kill_channel("gone");

    let report = s.dispatcher.dispatch(ban("troll", None)).await.unwrap();
    assert_eq!(report.count(DeliveryOutcome::Evicted), 1);
    assert_eq!(report.count(DeliveryOutcome::Sent), 1);

    assert_eq!(s.chat.sent_to("alive").len(), 1);
    let remaining = s.hooks.list_for_streamer(STREAMER).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].channel_id, "alive");
    assert_eq!(s.cache.counter(STREAMER), 1);
}

#[tokio::test]
async fn test_left_guild_is_evicted() {
    let s = setup();
    add_hook(&s, "g1", "c1", HookMode::Embed).await;
    s.chat.leave_guild("g1");

    let report = s.dispatcher.dispatch(ban("troll", None)).await.unwrap();
    assert_eq!(report.count(DeliveryOutcome::Evicted), 1);
    assert!(s.chat.sent().is_empty());
    assert!(s.hooks.all().is_empty());
    assert_eq!(s.cache.counter(STREAMER), 0);
}

#[tokio::test]
async fn test_ignored_moderator_is_skipped_per_guild() {
    let s = setup();
    add_hook(&s, "g1", "c1", HookMode::Minimal).await;
    add_hook(&s, "g2", "c2", HookMode::Minimal).await;
    s.cache.add_ignored_user("g1", "77").await.unwrap();

    let report = s.dispatcher.dispatch(ban("troll", None)).await.unwrap();
    assert_eq!(report.count(DeliveryOutcome::Ignored), 1);
    assert!(s.chat.sent_to("c1").is_empty());
    assert_eq!(s.chat.sent_to("c2").len(), 1);
}

#[tokio::test]
async fn test_no_hooks_sends_nothing() {
    let s = setup();
    let report = s.dispatcher.dispatch(ban("troll", None)).await.unwrap();
    assert!(report.outcomes.is_empty());
    assert!(s.chat.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_embed_bursts_are_rate_limited() {
    let s = setup();
    add_hook(&s, "g1", "c1", HookMode::Embed).await;

    for i in 0..7 {
        s.dispatcher.dispatch(ban(&format!("user{i}"), None)).await.unwrap();
    }

    let sent = s.chat.sent_to("c1");
    assert_eq!(sent.len(), 7);
    assert_within_rate(&sent);
}

#[tokio::test(start_paused = true)]
async fn test_minimal_bursts_merge_while_waiting() {
    let s = setup();
    add_hook(&s, "g1", "c1", HookMode::Minimal).await;

    let mut tasks = Vec::new();
    for i in 0..7 {
        let dispatcher = s.dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            dispatcher.dispatch(ban(&format!("user{i}"), None)).await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let sent = s.chat.sent_to("c1");
    assert!(sent.len() <= 6, "expected a merge, got {} messages", sent.len());
    assert_within_rate(&sent);

    let all_text: Vec<&str> = sent.iter().flat_map(|m| text(m).lines()).collect();
    assert_eq!(all_text.len(), 7);
    for i in 0..7 {
        let needle = format!("`/ban user{i}`");
        assert_eq!(all_text.iter().filter(|l| l.contains(&needle)).count(), 1);
    }
}
