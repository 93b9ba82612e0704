// File: modlogs-core/src/services/webhook_service.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use http::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use modlogs_common::models::ModerationAction;
use modlogs_common::traits::CacheStore;

use crate::Error;
use crate::platforms::twitch_eventsub::{CallbackEnvelope, normalize, signature};
use crate::services::dedup::{DedupKey, DedupOutcome, DeduplicationGate};
use crate::services::dispatcher::DispatchJob;

/// Deliveries older than this are refused as possible replays.
pub const MAX_MESSAGE_AGE: Duration = Duration::minutes(10);

/// One inbound webhook request, headers already pulled out of the transport.
#[derive(Debug, Clone, Copy)]
pub struct WebhookDelivery<'a> {
    pub event_type: &'a str,
    pub streamer_id: &'a str,
    pub message_id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub body: Option<String>,
}

impl WebhookResponse {
    pub fn status(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    pub fn ok() -> Self {
        Self::status(StatusCode::OK)
    }

    pub fn challenge(challenge: String) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(challenge),
        }
    }
}

/// Why a delivery was turned away before it reached the dedup gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UnknownSubscription,
    StoreUnavailable,
    MissingMessageId,
    StaleOrInvalidTimestamp,
    SignatureMismatch,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::UnknownSubscription => StatusCode::NOT_FOUND,
            Rejection::StoreUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            Rejection::MissingMessageId | Rejection::StaleOrInvalidTimestamp => StatusCode::BAD_REQUEST,
            Rejection::SignatureMismatch => StatusCode::FORBIDDEN,
        }
    }
}

/// A delivery that passed signature verification.
struct Verified<'a> {
    action: ModerationAction,
    message_id: &'a str,
    sent_at: DateTime<Utc>,
}

/// Ingestion pipeline: verify, deduplicate, handle control messages inline,
/// normalize data events and hand them to the dispatcher queue.
pub struct WebhookService {
    cache: Arc<dyn CacheStore>,
    dedup: DeduplicationGate,
    queue: mpsc::Sender<DispatchJob>,
}

impl WebhookService {
    pub fn new(cache: Arc<dyn CacheStore>, dedup: DeduplicationGate, queue: mpsc::Sender<DispatchJob>) -> Self {
        Self { cache, dedup, queue }
    }

    pub async fn handle(&self, delivery: WebhookDelivery<'_>) -> WebhookResponse {
        let verified = match self.verify(&delivery).await {
            Ok(v) => v,
            Err(rejection) => {
                debug!(
                    event_type = delivery.event_type,
                    streamer = delivery.streamer_id,
                    ?rejection,
                    "Rejected webhook delivery"
                );
                return WebhookResponse::status(rejection.status());
            }
        };

        let key = match self
            .dedup
            .claim(delivery.event_type, delivery.streamer_id, verified.message_id)
            .await
        {
            Ok(DedupOutcome::Fresh(key)) => key,
            Ok(DedupOutcome::Duplicate) => {
                warn!(
                    event_type = delivery.event_type,
                    streamer = delivery.streamer_id,
                    message_id = verified.message_id,
                    "Duplicate webhook delivery"
                );
                return WebhookResponse::ok();
            }
            Err(e) => {
                error!(error = %e, "Dedup store unavailable");
                return WebhookResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let response = self.process(&delivery, &verified, key.clone()).await;
        if response.status != StatusCode::OK {
            self.dedup.release(&key).await;
        }
        response
    }

    /// Secret lookup, header checks and the HMAC comparison.
    async fn verify<'a>(&self, delivery: &WebhookDelivery<'a>) -> Result<Verified<'a>, Rejection> {
        let action: ModerationAction = delivery
            .event_type
            .parse()
            .map_err(|_| Rejection::UnknownSubscription)?;

        let secret = match self.cache.get_webhook_secret(action, delivery.streamer_id).await {
            Ok(Some(record)) if !record.secret.is_empty() => record.secret,
            Ok(_) => return Err(Rejection::UnknownSubscription),
            Err(e) => {
                error!(error = %e, "Secret lookup failed");
                return Err(Rejection::StoreUnavailable);
            }
        };

        let raw_ts = delivery.timestamp.ok_or(Rejection::StaleOrInvalidTimestamp)?;
        let sent_at = DateTime::parse_from_rfc3339(raw_ts)
            .map_err(|_| Rejection::StaleOrInvalidTimestamp)?
            .with_timezone(&Utc);
        if sent_at < Utc::now() - MAX_MESSAGE_AGE {
            return Err(Rejection::StaleOrInvalidTimestamp);
        }

        let message_id = delivery
            .message_id
            .filter(|id| !id.is_empty())
            .ok_or(Rejection::MissingMessageId)?;

        let provided = delivery.signature.unwrap_or_default();
        if !signature::verify(&secret, message_id, raw_ts, delivery.body, provided) {
            return Err(Rejection::SignatureMismatch);
        }

        Ok(Verified { action, message_id, sent_at })
    }

    async fn process(
        &self,
        delivery: &WebhookDelivery<'_>,
        verified: &Verified<'_>,
        key: DedupKey,
    ) -> WebhookResponse {
        let envelope: CallbackEnvelope = match serde_json::from_slice(delivery.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "Malformed callback body");
                return WebhookResponse::status(StatusCode::BAD_REQUEST);
            }
        };

        // The secret was picked by the path type; the body must agree with it.
        if envelope.subscription.kind != delivery.event_type {
            warn!(
                event_type = delivery.event_type,
                body_type = %envelope.subscription.kind,
                streamer = delivery.streamer_id,
                "Subscription type does not match callback path"
            );
            return WebhookResponse::status(StatusCode::BAD_REQUEST);
        }

        if envelope.subscription.is_authorization_revoked() {
            info!(
                event_type = delivery.event_type,
                streamer = delivery.streamer_id,
                "Subscription authorization revoked"
            );
            if let Err(e) = self
                .cache
                .delete_webhook_secret(verified.action, delivery.streamer_id)
                .await
            {
                error!(error = %e, "Failed to delete revoked webhook secret");
            }
            return WebhookResponse::ok();
        }

        if let Some(challenge) = envelope.challenge.filter(|c| !c.is_empty()) {
            if let Err(e) = self
                .cache
                .set_subscription_id(verified.action, delivery.streamer_id, &envelope.subscription.id)
                .await
            {
                error!(error = %e, "Failed to store subscription id");
                return WebhookResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
            info!(
                event_type = delivery.event_type,
                streamer = delivery.streamer_id,
                subscription = %envelope.subscription.id,
                "Subscription verified"
            );
            return WebhookResponse::challenge(challenge);
        }

        let event = match normalize(
            delivery.event_type,
            delivery.streamer_id,
            verified.sent_at,
            &envelope.event,
        ) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    event_type = delivery.event_type,
                    streamer = delivery.streamer_id,
                    error = %e,
                    "Rejected moderation event"
                );
                return WebhookResponse::status(StatusCode::BAD_REQUEST);
            }
        };

        let job = DispatchJob {
            event,
            dedup_key: Some(key),
        };
        if let Err(e) = self.enqueue(job).await {
            error!(error = %e, "Dropping moderation event");
            return WebhookResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
        }
        WebhookResponse::ok()
    }

    async fn enqueue(&self, job: DispatchJob) -> Result<(), Error> {
        self.queue.send(job).await.map_err(|_| Error::QueueClosed)
    }
}
