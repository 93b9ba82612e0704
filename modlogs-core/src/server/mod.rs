// File: modlogs-core/src/server/mod.rs

pub mod login;
pub mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_server::{Handle, Server};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use modlogs_common::traits::{CacheStore, TwitchApi, UserRepository};

use crate::Error;
use crate::services::webhook_service::WebhookService;

pub const AUTHORIZE_URL: &str = "https://id.twitch.tv/oauth2/authorize";

/// How long in-flight requests get to finish once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Settings for the browser-facing login flow.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub website_url: String,
    pub invite_url: String,
    pub cookie_domain: Option<String>,
}

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub webhooks: Arc<WebhookService>,
    pub twitch: Arc<dyn TwitchApi>,
    pub users: Arc<dyn UserRepository>,
    pub cache: Arc<dyn CacheStore>,
    pub login: Arc<LoginConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login::login))
        .route("/login/callback", get(login::login_callback))
        .route("/webhook/{event_type}/{streamer_id}", post(webhook::receive))
        .fallback(not_found)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn index(axum::extract::State(state): axum::extract::State<AppState>) -> Redirect {
    Redirect::temporary(&state.login.invite_url)
}

async fn not_found() -> Response {
    json_status(StatusCode::NOT_FOUND, "We don't know what you're looking for.")
}

/// `{"status": <code>, "message": <message>}` with the same status code.
pub fn json_status(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "status": status.as_u16(),
            "message": message,
        })),
    )
        .into_response()
}

/// Binds and serves until `shutdown` fires, then drains for a grace period.
pub async fn serve(addr: SocketAddr, app: Router, shutdown: CancellationToken) -> Result<(), Error> {
    let handle = Handle::new();
    let handle_clone = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        handle_clone.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    info!("HTTP server listening on http://{}", addr);
    Server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| {
            error!("HTTP server error: {}", e);
            Error::Io(e)
        })?;
    info!("HTTP server shut down.");
    Ok(())
}
