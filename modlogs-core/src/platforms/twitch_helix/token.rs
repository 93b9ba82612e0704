// File: modlogs-core/src/platforms/twitch_helix/token.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::Error;

/// Longest time a fetched app token is reused, whatever the provider says.
const MAX_TOKEN_REUSE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Deserialize)]
pub struct AppToken {
    pub access_token: String,
    pub expires_in: u64,
}

impl AppToken {
    /// 75% of the advertised lifetime, capped at one hour.
    pub fn reuse_for(&self) -> Duration {
        let three_quarters = Duration::from_secs(self.expires_in.saturating_mul(3) / 4);
        three_quarters.min(MAX_TOKEN_REUSE)
    }
}

/// Something that can mint a fresh app access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<AppToken, Error>;
}

/// Client-credentials grant against the Twitch identity service.
pub struct ClientCredentials {
    http: ReqwestClient,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(http: ReqwestClient, id_base_url: &str, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth2/token", id_base_url.trim_end_matches('/')),
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn fetch(&self) -> Result<AppToken, Error> {
        let params = [
            ("client_id",     self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type",    "client_credentials"),
        ];

        let resp = self.http.post(&self.token_url).form(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("token endpoint returned {status}: {body}")));
        }
        Ok(resp.json::<AppToken>().await?)
    }
}

struct CachedToken {
    value: String,
    valid_until: Instant,
}

/// Process-wide app token. Callers that miss the cache queue on the same
/// lock, so only one fetch is ever in flight and everyone shares its result.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            slot: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Result<String, Error> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.valid_until {
                return Ok(cached.value.clone());
            }
            debug!("App token reached its reuse limit; refreshing.");
        }

        let token = self.source.fetch().await?;
        let reuse_for = token.reuse_for();
        info!(reuse_secs = reuse_for.as_secs(), "Fetched new Twitch app token");
        *slot = Some(CachedToken {
            value: token.access_token.clone(),
            valid_until: Instant::now() + reuse_for,
        });
        Ok(token.access_token)
    }

    /// Drops the cached token; the next `get` fetches a new one.
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }
}
