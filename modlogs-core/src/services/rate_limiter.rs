// File: modlogs-core/src/services/rate_limiter.rs

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Discord rejects messages longer than this.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Idle buckets are swept once every this many `limit` calls.
const PRUNE_EVERY: u64 = 256;

/// Something a later notification can be folded into while it waits for a
/// send slot.
pub trait Merge: Send + Sync {
    /// Returns `true` when `content` was absorbed.
    fn try_merge(&self, content: &str) -> bool;
}

/// Embeds are always sent on their own.
pub struct NeverMerge;

impl Merge for NeverMerge {
    fn try_merge(&self, _content: &str) -> bool {
        false
    }
}

/// Text accumulator for minimal-mode notifications. Lines are joined with a
/// newline as long as the result stays within one chat message. Empty
/// content (an embed passing through the same channel) is never absorbed.
pub struct MergeBuffer {
    text: Mutex<String>,
}

impl MergeBuffer {
    pub fn new(initial: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            text: Mutex::new(initial.into()),
        })
    }

    /// Current content. Read it after `limit` returned `true`; from then on
    /// nothing can be merged into it.
    pub fn contents(&self) -> String {
        self.text.lock().clone()
    }
}

impl Merge for MergeBuffer {
    fn try_merge(&self, content: &str) -> bool {
        if content.is_empty() {
            return false;
        }
        let mut text = self.text.lock();
        let merged_len = text.chars().count() + 1 + content.chars().count();
        if merged_len > MAX_MESSAGE_CHARS {
            return false;
        }
        text.push('\n');
        text.push_str(content);
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Sends allowed in any window.
    pub capacity: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            window: Duration::from_secs(10),
        }
    }
}

/// Send times inside the current window; a slot frees up `window` after it
/// was taken.
struct SendWindow {
    sent: VecDeque<Instant>,
    config: RateLimitConfig,
}

impl SendWindow {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            sent: VecDeque::with_capacity(config.capacity),
            config,
        }
    }

    async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            while self
                .sent
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.config.window)
            {
                self.sent.pop_front();
            }
            if self.sent.len() < self.config.capacity {
                self.sent.push_back(now);
                return;
            }
            match self.sent.front() {
                Some(oldest) => tokio::time::sleep_until(*oldest + self.config.window).await,
                None => return,
            }
        }
    }

    /// No send inside the window any more.
    fn expired(&self, now: Instant) -> bool {
        self.sent
            .back()
            .is_none_or(|t| now.duration_since(*t) >= self.config.window)
    }
}

/// Pending waiters in registration order.
#[derive(Default)]
struct WaiterRegistry {
    next_id: u64,
    waiting: BTreeMap<u64, Arc<dyn Merge>>,
}

impl WaiterRegistry {
    fn offer(&self, content: &str) -> bool {
        self.waiting.values().any(|m| m.try_merge(content))
    }

    fn register(&mut self, merger: Arc<dyn Merge>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.waiting.insert(id, merger);
        id
    }
}

struct ChannelBucket {
    window: tokio::sync::Mutex<SendWindow>,
    waiters: Mutex<WaiterRegistry>,
}

impl ChannelBucket {
    fn is_idle(&self, now: Instant) -> bool {
        if !self.waiters.lock().waiting.is_empty() {
            return false;
        }
        match self.window.try_lock() {
            Ok(window) => window.expired(now),
            Err(_) => false,
        }
    }
}

/// Deregisters on drop, so a cancelled `limit` call never leaves a waiter
/// behind that silently swallows merged content.
struct WaiterGuard<'a> {
    bucket: &'a ChannelBucket,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.bucket.waiters.lock().waiting.remove(&self.id);
    }
}

/// Per-channel send limiter that merges notifications while they wait.
pub struct ChannelRateLimiter {
    buckets: DashMap<String, Arc<ChannelBucket>>,
    config: RateLimitConfig,
    calls: AtomicU64,
}

impl Default for ChannelRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl ChannelRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
            calls: AtomicU64::new(0),
        }
    }

    fn bucket(&self, channel_id: &str) -> Arc<ChannelBucket> {
        self.buckets
            .entry(channel_id.to_string())
            .or_insert_with(|| {
                Arc::new(ChannelBucket {
                    window: tokio::sync::Mutex::new(SendWindow::new(self.config)),
                    waiters: Mutex::new(WaiterRegistry::default()),
                })
            })
            .clone()
    }

    /// Returns `false` if `content` was merged into a waiting notification,
    /// in which case the caller must not send. Otherwise waits for a send
    /// slot and returns `true`; the caller then sends whatever its `merger`
    /// holds.
    pub async fn limit(&self, channel_id: &str, content: &str, merger: Arc<dyn Merge>) -> bool {
        if self.calls.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune_idle();
        }
        let bucket = self.bucket(channel_id);

        let id = {
            let mut waiters = bucket.waiters.lock();
            if waiters.offer(content) {
                trace!(channel = %channel_id, "Merged notification into a pending send");
                return false;
            }
            waiters.register(merger)
        };
        let guard = WaiterGuard { bucket: &bucket, id };

        bucket.window.lock().await.acquire().await;

        drop(guard);
        true
    }

    /// Drops buckets nobody is using whose send window has fully expired.
    /// A bucket still referenced by a `limit` call is kept. Returns how many
    /// were removed.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| Arc::strong_count(bucket) > 1 || !bucket.is_idle(now));
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, remaining = self.buckets.len(), "Pruned idle rate limit buckets");
        }
        removed
    }

    /// Number of notifications currently waiting on the channel.
    pub fn pending(&self, channel_id: &str) -> usize {
        self.buckets
            .get(channel_id)
            .map(|b| b.waiters.lock().waiting.len())
            .unwrap_or(0)
    }
}
