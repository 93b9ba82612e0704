// File: modlogs-core/src/services/dedup.rs

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use modlogs_common::traits::{CacheStore, ClaimOutcome};

use crate::Error;
use crate::cache::keys;

/// How long a delivered message id is remembered.
pub const DEDUP_TTL: Duration = Duration::from_secs(30 * 60);

/// Idempotency key of one claimed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(event_type: &str, streamer_id: &str, message_id: &str) -> Self {
        Self(keys::delivery(event_type, streamer_id, message_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    /// First sighting; the caller owns the key until it releases it or the TTL runs out.
    Fresh(DedupKey),
    Duplicate,
}

/// Set-if-absent gate over the cache store that drops redelivered messages.
#[derive(Clone)]
pub struct DeduplicationGate {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl DeduplicationGate {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_ttl(store, DEDUP_TTL)
    }

    pub fn with_ttl(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn claim(
        &self,
        event_type: &str,
        streamer_id: &str,
        message_id: &str,
    ) -> Result<DedupOutcome, Error> {
        let key = DedupKey::new(event_type, streamer_id, message_id);
        match self.store.claim_key(key.as_str(), self.ttl).await? {
            ClaimOutcome::Claimed => Ok(DedupOutcome::Fresh(key)),
            ClaimOutcome::AlreadyPresent => Ok(DedupOutcome::Duplicate),
        }
    }

    /// Forgets a claimed delivery so the provider's retry is processed again.
    /// Failures are logged; the record expires on its own.
    pub async fn release(&self, key: &DedupKey) {
        if let Err(e) = self.store.release_key(key.as_str()).await {
            warn!(key = key.as_str(), error = %e, "Failed to release dedup key");
        }
    }
}
