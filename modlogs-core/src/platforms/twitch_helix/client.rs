// File: modlogs-core/src/platforms/twitch_helix/client.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use modlogs_common::models::{TwitchUser, UpstreamSubscription, UserAccessToken};
use modlogs_common::traits::{CreateSubscription, TwitchApi};

use super::token::{ClientCredentials, TokenCache};
use crate::Error;

pub const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";
pub const ID_BASE_URL: &str = "https://id.twitch.tv";

/// Outbound request timeout for every Twitch call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Helix caps `id`/`login` query parameters per request.
const USERS_PER_REQUEST: usize = 100;

#[derive(Debug, Clone)]
pub struct HelixConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub helix_base_url: String,
    pub id_base_url: String,
}

impl HelixConfig {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            helix_base_url: HELIX_BASE_URL.to_string(),
            id_base_url: ID_BASE_URL.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct DataPage<T> {
    data: Vec<T>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct Pagination {
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct HelixUser {
    id: String,
    login: String,
    display_name: String,
}

impl From<HelixUser> for TwitchUser {
    fn from(u: HelixUser) -> Self {
        TwitchUser {
            id: u.id,
            login: u.login,
            display_name: u.display_name,
        }
    }
}

#[derive(Deserialize)]
struct HelixSubscription {
    id: String,
    status: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    condition: serde_json::Value,
}

impl From<HelixSubscription> for UpstreamSubscription {
    fn from(s: HelixSubscription) -> Self {
        let broadcaster_user_id = s
            .condition
            .get("broadcaster_user_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        UpstreamSubscription {
            id: s.id,
            status: s.status,
            kind: s.kind,
            broadcaster_user_id,
        }
    }
}

/// Twitch Helix + identity client authenticated with a cached app token.
pub struct HelixClient {
    http: ReqwestClient,
    config: HelixConfig,
    tokens: Arc<TokenCache>,
}

impl HelixClient {
    pub fn new(config: HelixConfig) -> Result<Self, Error> {
        let http = ReqwestClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        let source = ClientCredentials::new(
            http.clone(),
            &config.id_base_url,
            config.client_id.clone(),
            config.client_secret.clone(),
        );
        let tokens = Arc::new(TokenCache::new(Arc::new(source)));
        Ok(Self::with_token_cache(http, config, tokens))
    }

    pub fn with_token_cache(http: ReqwestClient, config: HelixConfig, tokens: Arc<TokenCache>) -> Self {
        Self { http, config, tokens }
    }

    fn helix_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.helix_base_url.trim_end_matches('/'), path)
    }

    /// Sends an app-authenticated request. A 401 invalidates the cached token
    /// and the request is retried once with a fresh one.
    async fn send_app<F>(&self, build: F) -> Result<Response, Error>
    where
        F: Fn(&ReqwestClient) -> RequestBuilder,
    {
        let mut retried = false;
        loop {
            let token = self.tokens.get().await?;
            let resp = build(&self.http)
                .bearer_auth(&token)
                .header("Client-Id", &self.config.client_id)
                .send()
                .await?;

            if resp.status() == StatusCode::UNAUTHORIZED && !retried {
                warn!("Twitch rejected the app token; fetching a new one and retrying.");
                self.tokens.invalidate().await;
                retried = true;
                continue;
            }
            return check_status(resp).await;
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Upstream { status: status.as_u16(), body })
}

#[async_trait]
impl TwitchApi for HelixClient {
    async fn get_users(&self, ids: &[String], logins: &[String]) -> Result<Vec<TwitchUser>, Error> {
        let mut params: Vec<(&str, &str)> = Vec::with_capacity(ids.len() + logins.len());
        params.extend(ids.iter().map(|id| ("id", id.as_str())));
        params.extend(logins.iter().map(|login| ("login", login.as_str())));

        let url = self.helix_url("users");
        let mut out = Vec::new();
        for chunk in params.chunks(USERS_PER_REQUEST) {
            let resp = self.send_app(|http| http.get(&url).query(chunk)).await?;
            let page: DataPage<HelixUser> = resp.json().await?;
            out.extend(page.data.into_iter().map(TwitchUser::from));
        }
        Ok(out)
    }

    async fn get_token_user(&self, access_token: &str) -> Result<Option<TwitchUser>, Error> {
        let resp = self
            .http
            .get(self.helix_url("users"))
            .bearer_auth(access_token)
            .header("Client-Id", &self.config.client_id)
            .send()
            .await?;
        let page: DataPage<HelixUser> = check_status(resp).await?.json().await?;
        Ok(page.data.into_iter().next().map(TwitchUser::from))
    }

    async fn exchange_code(&self, code: &str) -> Result<UserAccessToken, Error> {
        let token_url = format!("{}/oauth2/token", self.config.id_base_url.trim_end_matches('/'));
        let params = [
            ("client_id",     self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code",          code),
            ("grant_type",    "authorization_code"),
            ("redirect_uri",  self.config.redirect_uri.as_str()),
        ];

        let resp = self.http.post(token_url).form(&params).send().await?;
        let token = check_status(resp)
            .await
            .map_err(|e| Error::Auth(format!("Twitch token endpoint error: {e}")))?
            .json::<UserAccessToken>()
            .await?;
        Ok(token)
    }

    async fn create_subscription(&self, request: &CreateSubscription) -> Result<String, Error> {
        let url = self.helix_url("eventsub/subscriptions");
        let resp = self.send_app(|http| http.post(&url).json(request)).await?;
        let page: DataPage<HelixSubscription> = resp.json().await?;
        let id = page
            .data
            .into_iter()
            .next()
            .map(|s| s.id)
            .ok_or_else(|| Error::Parse(format!("No subscription returned for {}", request.kind)))?;
        debug!(
            kind = %request.kind,
            broadcaster = %request.condition.broadcaster_user_id,
            subscription = %id,
            "Created EventSub subscription"
        );
        Ok(id)
    }

    async fn list_subscriptions(&self) -> Result<Vec<UpstreamSubscription>, Error> {
        let url = self.helix_url("eventsub/subscriptions");
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let after = cursor.clone();
            let resp = self
                .send_app(|http| {
                    let req = http.get(&url);
                    match &after {
                        Some(c) => req.query(&[("after", c.as_str())]),
                        None => req,
                    }
                })
                .await?;
            let page: DataPage<HelixSubscription> = resp.json().await?;
            out.extend(page.data.into_iter().map(UpstreamSubscription::from));

            cursor = page.pagination.and_then(|p| p.cursor).filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), Error> {
        let url = self.helix_url("eventsub/subscriptions");
        self.send_app(|http| http.delete(&url).query(&[("id", subscription_id)]))
            .await?;
        Ok(())
    }
}
