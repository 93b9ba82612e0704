// tests/helix_client_tests.rs

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modlogs_common::error::Error;
use modlogs_common::models::ModerationAction;
use modlogs_common::traits::{CreateSubscription, TwitchApi};
use modlogs_core::platforms::twitch_helix::{HelixClient, HelixConfig};

fn client(server: &MockServer) -> HelixClient {
    let mut config = HelixConfig::new(
        "client-id".into(),
        "client-secret".into(),
        "https://modlogs.example/login/callback".into(),
    );
    config.helix_base_url = format!("{}/helix", server.uri());
    config.id_base_url = server.uri();
    HelixClient::new(config).unwrap()
}

fn app_token(token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": token,
        "expires_in": 5000000,
        "token_type": "bearer"
    }))
}

async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(app_token(token))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_users_sends_app_credentials() {
    let server = MockServer::start().await;
    mount_token(&server, "app-token").await;
    Mock::given(method("GET"))
        .and(path("/helix/users"))
        .and(header("authorization", "Bearer app-token"))
        .and(header("client-id", "client-id"))
        .and(query_param("login", "somestreamer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "1337", "login": "somestreamer", "display_name": "SomeStreamer"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let users = client(&server)
        .get_users(&[], &["somestreamer".to_string()])
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, "1337");
    assert_eq!(users[0].display_name, "SomeStreamer");
}

#[tokio::test]
async fn test_unauthorized_refreshes_token_and_retries_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(app_token("stale"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(app_token("fresh"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/helix/users"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/helix/users"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "1", "login": "a", "display_name": "A"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let users = client(&server).get_users(&["1".to_string()], &[]).await.unwrap();
    assert_eq!(users[0].login, "a");
}

#[tokio::test]
async fn test_second_unauthorized_is_returned() {
    let server = MockServer::start().await;
    mount_token(&server, "app-token").await;
    Mock::given(method("DELETE"))
        .and(path("/helix/eventsub/subscriptions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server).delete_subscription("sub-1").await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_list_subscriptions_follows_cursor() {
    let server = MockServer::start().await;
    mount_token(&server, "app-token").await;
    Mock::given(method("GET"))
        .and(path("/helix/eventsub/subscriptions"))
        .and(query_param("after", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "sub-b", "status": "enabled", "type": "channel.unban",
                "condition": {"broadcaster_user_id": "2"}
            }],
            "pagination": {}
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/helix/eventsub/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "sub-a", "status": "webhook_callback_verification_failed", "type": "channel.ban",
                "condition": {"broadcaster_user_id": "1"}
            }],
            "pagination": {"cursor": "page-2"}
        })))
        .mount(&server)
        .await;

    let subs = client(&server).list_subscriptions().await.unwrap();
    let ids: Vec<&str> = subs.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["sub-a", "sub-b"]);
    assert!(!subs[0].is_enabled());
    assert_eq!(subs[1].broadcaster_user_id.as_deref(), Some("2"));
}

#[tokio::test]
async fn test_create_subscription_posts_webhook_transport() {
    let server = MockServer::start().await;
    mount_token(&server, "app-token").await;
    Mock::given(method("POST"))
        .and(path("/helix/eventsub/subscriptions"))
        .and(body_partial_json(json!({
            "type": "channel.moderator.add",
            "version": "1",
            "condition": {"broadcaster_user_id": "1337"},
            "transport": {
                "method": "webhook",
                "callback": "https://modlogs.example/webhook/channel.moderator.add/1337"
            }
        })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "data": [{
                "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
                "status": "webhook_callback_verification_pending",
                "type": "channel.moderator.add",
                "version": "1",
                "condition": {"broadcaster_user_id": "1337"}
            }],
            "total": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = CreateSubscription::webhook(
        ModerationAction::ModeratorAdd,
        "1337",
        "https://modlogs.example/webhook/channel.moderator.add/1337".into(),
        "secret",
    );
    let id = client(&server).create_subscription(&request).await.unwrap();
    assert_eq!(id, "f1c2a387-161a-49f9-a165-0f21d7a4e1c4");
}

#[tokio::test]
async fn test_upstream_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    mount_token(&server, "app-token").await;
    Mock::given(method("POST"))
        .and(path("/helix/eventsub/subscriptions"))
        .respond_with(ResponseTemplate::new(409).set_body_string("subscription already exists"))
        .mount(&server)
        .await;

    let request = CreateSubscription::webhook(ModerationAction::Ban, "1", "https://x/cb".into(), "s");
    match client(&server).create_subscription(&request).await {
        Err(Error::Upstream { status, body }) => {
            assert_eq!(status, 409);
            assert_eq!(body, "subscription already exists");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exchange_code_failure_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid authorization code"))
        .mount(&server)
        .await;

    let err = client(&server).exchange_code("bad-code").await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
}
