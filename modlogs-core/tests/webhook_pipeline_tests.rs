// tests/webhook_pipeline_tests.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use http::StatusCode;
use serde_json::json;
use tokio::sync::mpsc;

use modlogs_common::models::ModerationAction;
use modlogs_common::traits::CacheStore;
use modlogs_core::platforms::twitch_eventsub::signature;
use modlogs_core::services::dedup::{DedupKey, DeduplicationGate};
use modlogs_core::services::dispatcher::DispatchJob;
use modlogs_core::services::webhook_service::{WebhookDelivery, WebhookService};
use modlogs_core::test_utils::MemoryCacheStore;

const SECRET: &str = "test-secret-value";
const STREAMER: &str = "1001";

struct Harness {
    service: WebhookService,
    cache: Arc<MemoryCacheStore>,
    rx: mpsc::Receiver<DispatchJob>,
}

async fn harness() -> Harness {
    let cache = Arc::new(MemoryCacheStore::new());
    for action in ModerationAction::ALL {
        cache.put_webhook_secret(action, STREAMER, SECRET).await.unwrap();
    }
    let (tx, rx) = mpsc::channel(16);
    let service = WebhookService::new(cache.clone(), DeduplicationGate::new(cache.clone()), tx);
    Harness { service, cache, rx }
}

struct Request {
    event_type: &'static str,
    message_id: String,
    timestamp: String,
    signature: String,
    body: Vec<u8>,
}

impl Request {
    fn signed(event_type: &'static str, message_id: &str, body: serde_json::Value) -> Self {
        let timestamp = Utc::now().to_rfc3339();
        let body = serde_json::to_vec(&body).unwrap();
        let signature = signature::sign(SECRET, message_id, &timestamp, &body);
        Self {
            event_type,
            message_id: message_id.to_string(),
            timestamp,
            signature,
            body,
        }
    }

    fn delivery(&self) -> WebhookDelivery<'_> {
        WebhookDelivery {
            event_type: self.event_type,
            streamer_id: STREAMER,
            message_id: Some(&self.message_id),
            timestamp: Some(&self.timestamp),
            signature: Some(&self.signature),
            body: &self.body,
        }
    }
}

fn ban_body(ends_at: Option<String>) -> serde_json::Value {
    json!({
        "subscription": {"id": "sub-1", "status": "enabled", "type": "channel.ban"},
        "event": {
            "broadcaster_user_id": STREAMER,
            "broadcaster_user_name": "Streamer",
            "user_name": "troll",
            "reason": "spam",
            "moderator_user_id": "77",
            "moderator_user_name": "ModName",
            "is_permanent": ends_at.is_none(),
            "ends_at": ends_at,
        }
    })
}

fn dedup_key(event_type: &str, message_id: &str) -> String {
    DedupKey::new(event_type, STREAMER, message_id).as_str().to_string()
}

#[tokio::test]
async fn test_signed_event_is_queued() {
    let mut h = harness().await;
    let ends_at = (Utc::now() + Duration::seconds(600)).to_rfc3339();
    let req = Request::signed("channel.ban", "msg-1", ban_body(Some(ends_at)));

    let resp = h.service.handle(req.delivery()).await;
    assert_eq!(resp.status, StatusCode::OK);

    let job = h.rx.try_recv().expect("job queued");
    assert_eq!(job.event.broadcaster_id, STREAMER);
    assert_eq!(job.event.target_user_name, "troll");
    assert!(job.event.is_timeout());
    assert!(h.cache.has_key(&dedup_key("channel.ban", "msg-1")));
}

#[tokio::test]
async fn test_bad_signature_is_forbidden() {
    let mut h = harness().await;
    let mut req = Request::signed("channel.ban", "msg-1", ban_body(None));
    req.signature = signature::sign("some-other-secret", "msg-1", &req.timestamp, &req.body);

    let resp = h.service.handle(req.delivery()).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert!(h.rx.try_recv().is_err());
    assert!(!h.cache.has_key(&dedup_key("channel.ban", "msg-1")));
}

#[tokio::test]
async fn test_stale_timestamp_is_rejected() {
    let mut h = harness().await;
    let mut req = Request::signed("channel.ban", "msg-1", ban_body(None));
    req.timestamp = (Utc::now() - Duration::minutes(11)).to_rfc3339();
    req.signature = signature::sign(SECRET, "msg-1", &req.timestamp, &req.body);

    let resp = h.service.handle(req.delivery()).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(h.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_missing_message_id_is_rejected() {
    let h = harness().await;
    let req = Request::signed("channel.ban", "msg-1", ban_body(None));
    let mut delivery = req.delivery();
    delivery.message_id = None;

    assert_eq!(h.service.handle(delivery).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_streamer_is_not_found() {
    let h = harness().await;
    let req = Request::signed("channel.ban", "msg-1", ban_body(None));
    let mut delivery = req.delivery();
    delivery.streamer_id = "9999";

    assert_eq!(h.service.handle(delivery).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_redelivery_is_acknowledged_once() {
    let mut h = harness().await;
    let req = Request::signed("channel.ban", "msg-1", ban_body(None));

    assert_eq!(h.service.handle(req.delivery()).await.status, StatusCode::OK);
    assert_eq!(h.service.handle(req.delivery()).await.status, StatusCode::OK);

    assert!(h.rx.try_recv().is_ok());
    assert!(h.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_malformed_event_releases_claim() {
    let mut h = harness().await;
    let mut body = ban_body(None);
    body["event"]
        .as_object_mut()
        .unwrap()
        .remove("moderator_user_name");
    let req = Request::signed("channel.ban", "msg-1", body);

    let resp = h.service.handle(req.delivery()).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(!h.cache.has_key(&dedup_key("channel.ban", "msg-1")));

    // A corrected redelivery with the same id goes through.
    let fixed = Request::signed("channel.ban", "msg-1", ban_body(None));
    assert_eq!(h.service.handle(fixed.delivery()).await.status, StatusCode::OK);
    assert!(h.rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_challenge_is_echoed() {
    let h = harness().await;
    let req = Request::signed(
        "channel.moderator.add",
        "msg-verify",
        json!({
            "challenge": "abc123",
            "subscription": {
                "id": "sub-77",
                "status": "webhook_callback_verification_pending",
                "type": "channel.moderator.add"
            }
        }),
    );

    let resp = h.service.handle(req.delivery()).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body.as_deref(), Some("abc123"));

    let record = h
        .cache
        .get_webhook_secret(ModerationAction::ModeratorAdd, STREAMER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.subscription_id.as_deref(), Some("sub-77"));
}

#[tokio::test]
async fn test_revocation_deletes_secret() {
    let mut h = harness().await;
    let req = Request::signed(
        "channel.unban",
        "msg-revoke",
        json!({
            "subscription": {"id": "sub-5", "status": "authorization_revoked", "type": "channel.unban"}
        }),
    );

    let resp = h.service.handle(req.delivery()).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(h.rx.try_recv().is_err());
    assert_eq!(
        h.cache
            .get_webhook_secret(ModerationAction::Unban, STREAMER)
            .await
            .unwrap(),
        None
    );

    // Later deliveries for the revoked type find no secret.
    let next = Request::signed("channel.unban", "msg-2", json!({}));
    assert_eq!(h.service.handle(next.delivery()).await.status, StatusCode::NOT_FOUND);
}
