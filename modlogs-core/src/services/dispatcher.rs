// File: modlogs-core/src/services/dispatcher.rs

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use modlogs_common::models::{HookMode, HookTarget, ModerationEvent};
use modlogs_common::traits::{CacheStore, ChatPlatform};

use crate::Error;
use crate::services::dedup::{DedupKey, DeduplicationGate};
use crate::services::hook_resolver::HookResolver;
use crate::services::rate_limiter::{ChannelRateLimiter, MergeBuffer, NeverMerge};
use crate::services::render::{RenderedEvent, render};
use crate::services::subscription_registry::SubscriptionRegistry;

/// One accepted notification on its way to the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub event: ModerationEvent,
    /// Released if the job cannot be processed at all.
    pub dedup_key: Option<DedupKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// Folded into another notification waiting on the same channel.
    Merged,
    /// The acting user is on the guild's ignore list.
    Ignored,
    /// The destination is gone; its hook was removed.
    Evicted,
    Failed,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<(HookTarget, DeliveryOutcome)>,
}

impl DispatchReport {
    pub fn count(&self, outcome: DeliveryOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

/// Fans a normalized event out to every hook of its streamer. Each
/// destination runs in its own task; one slow or broken channel never holds
/// up the others.
pub struct Dispatcher {
    resolver: HookResolver,
    registry: Arc<SubscriptionRegistry>,
    cache: Arc<dyn CacheStore>,
    chat: Arc<dyn ChatPlatform>,
    limiter: Arc<ChannelRateLimiter>,
    dedup: DeduplicationGate,
    footer: String,
}

impl Dispatcher {
    pub fn new(
        resolver: HookResolver,
        registry: Arc<SubscriptionRegistry>,
        cache: Arc<dyn CacheStore>,
        chat: Arc<dyn ChatPlatform>,
        limiter: Arc<ChannelRateLimiter>,
        dedup: DeduplicationGate,
        footer: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            registry,
            cache,
            chat,
            limiter,
            dedup,
            footer: footer.into(),
        }
    }

    pub async fn dispatch(self: &Arc<Self>, job: DispatchJob) -> Result<DispatchReport, Error> {
        let DispatchJob { event, dedup_key } = job;

        let targets = match self.resolver.resolve(&event.broadcaster_id).await {
            Ok(targets) => targets,
            Err(e) => {
                if let Some(key) = &dedup_key {
                    self.dedup.release(key).await;
                }
                return Err(e);
            }
        };
        if targets.is_empty() {
            debug!(streamer = %event.broadcaster_id, "No hooks for streamer");
            return Ok(DispatchReport::default());
        }

        let rendered = Arc::new(render(&event, &self.footer));
        let event = Arc::new(event);

        let mut tasks = JoinSet::new();
        for target in targets {
            let this = self.clone();
            let event = event.clone();
            let rendered = rendered.clone();
            tasks.spawn(async move {
                let outcome = this.deliver(&target, &event, &rendered).await;
                (target, outcome)
            });
        }

        let mut report = DispatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => report.outcomes.push(result),
                Err(e) => error!(streamer = %event.broadcaster_id, error = %e, "Delivery task panicked"),
            }
        }
        Ok(report)
    }

    async fn deliver(
        &self,
        target: &HookTarget,
        event: &ModerationEvent,
        rendered: &RenderedEvent,
    ) -> DeliveryOutcome {
        match self.chat.is_guild_member(&target.guild_id).await {
            Ok(true) => {}
            Ok(false) => return self.evict(target, event, "bot left the guild").await,
            Err(e) => warn!(guild = %target.guild_id, error = %e, "Guild membership check failed"),
        }

        match self
            .cache
            .is_user_ignored(&target.guild_id, event.acting_user_id())
            .await
        {
            Ok(true) => return DeliveryOutcome::Ignored,
            Ok(false) => {}
            Err(e) => warn!(guild = %target.guild_id, error = %e, "Ignore list lookup failed"),
        }

        let sent = match target.mode {
            HookMode::Embed => {
                if !self.limiter.limit(&target.channel_id, "", Arc::new(NeverMerge)).await {
                    return DeliveryOutcome::Merged;
                }
                self.chat.send_embed(&target.channel_id, &rendered.embed).await
            }
            HookMode::Minimal => {
                let buffer = MergeBuffer::new(rendered.minimal.clone());
                if !self
                    .limiter
                    .limit(&target.channel_id, &rendered.minimal, buffer.clone())
                    .await
                {
                    return DeliveryOutcome::Merged;
                }
                self.chat.send_message(&target.channel_id, &buffer.contents()).await
            }
        };

        match sent {
            Ok(()) => DeliveryOutcome::Sent,
            Err(Error::DestinationUnavailable(reason)) => self.evict(target, event, &reason).await,
            Err(e) => {
                error!(
                    streamer = %event.broadcaster_id,
                    guild = %target.guild_id,
                    channel = %target.channel_id,
                    action = %event.action,
                    error = %e,
                    "Failed to deliver notification"
                );
                DeliveryOutcome::Failed
            }
        }
    }

    async fn evict(&self, target: &HookTarget, event: &ModerationEvent, reason: &str) -> DeliveryOutcome {
        info!(
            streamer = %event.broadcaster_id,
            guild = %target.guild_id,
            channel = %target.channel_id,
            reason,
            "Destination unavailable; removing hook"
        );
        let hook = target.clone().into_hook(&event.broadcaster_id);
        match self.registry.evict_hook(&hook).await {
            Ok(_) => DeliveryOutcome::Evicted,
            Err(e) => {
                error!(
                    streamer = %event.broadcaster_id,
                    guild = %target.guild_id,
                    channel = %target.channel_id,
                    error = %e,
                    "Failed to evict hook"
                );
                DeliveryOutcome::Failed
            }
        }
    }

    /// Starts `workers` tasks draining the queue until it closes or
    /// `shutdown` fires.
    pub fn spawn_workers(
        self: &Arc<Self>,
        rx: mpsc::Receiver<DispatchJob>,
        workers: usize,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let rx = Arc::new(Mutex::new(rx));
        (0..workers.max(1))
            .map(|worker| {
                let this = self.clone();
                let rx = rx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    loop {
                        let job = tokio::select! {
                            _ = shutdown.cancelled() => break,
                            job = async { rx.lock().await.recv().await } => job,
                        };
                        let Some(job) = job else { break };
                        this.process(job).await;
                    }
                    debug!(worker, "Dispatch worker stopped");
                })
            })
            .collect()
    }

    async fn process(self: &Arc<Self>, job: DispatchJob) {
        let streamer = job.event.broadcaster_id.clone();
        let action = job.event.action;
        match self.dispatch(job).await {
            Ok(report) => debug!(
                streamer = %streamer,
                action = %action,
                sent = report.count(DeliveryOutcome::Sent),
                merged = report.count(DeliveryOutcome::Merged),
                ignored = report.count(DeliveryOutcome::Ignored),
                evicted = report.count(DeliveryOutcome::Evicted),
                failed = report.count(DeliveryOutcome::Failed),
                "Dispatched moderation event"
            ),
            Err(e) => error!(streamer = %streamer, action = %action, error = %e, "Failed to resolve hooks"),
        }
    }
}
