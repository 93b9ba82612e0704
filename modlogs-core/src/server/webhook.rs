// File: modlogs-core/src/server/webhook.rs

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::platforms::twitch_eventsub::signature::{
    MESSAGE_ID_HEADER, MESSAGE_SIGNATURE_HEADER, MESSAGE_TIMESTAMP_HEADER,
};
use crate::services::webhook_service::WebhookDelivery;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `POST /webhook/{event_type}/{streamer_id}`
pub async fn receive(
    State(state): State<AppState>,
    Path((event_type, streamer_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = WebhookDelivery {
        event_type: &event_type,
        streamer_id: &streamer_id,
        message_id: header(&headers, MESSAGE_ID_HEADER),
        timestamp: header(&headers, MESSAGE_TIMESTAMP_HEADER),
        signature: header(&headers, MESSAGE_SIGNATURE_HEADER),
        body: &body,
    };
    let response = state.webhooks.handle(delivery).await;
    match response.body {
        Some(body) => (response.status, body).into_response(),
        None => response.status.into_response(),
    }
}
