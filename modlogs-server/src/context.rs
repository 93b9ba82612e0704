//! modlogs-server/src/context.rs
//!
//! Builds every long-lived component once and hands out shared references.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use modlogs_common::traits::{CacheStore, ChatPlatform, HookRepository, TwitchApi, UserRepository};
use modlogs_core::Database;
use modlogs_core::Error;
use modlogs_core::cache::RedisStore;
use modlogs_core::platforms::discord::DiscordPlatform;
use modlogs_core::platforms::twitch_helix::{HelixClient, HelixConfig};
use modlogs_core::repositories::{PostgresHookRepository, PostgresUserRepository};
use modlogs_core::server::{AUTHORIZE_URL, AppState, LoginConfig};
use modlogs_core::services::dispatcher::DispatchJob;
use modlogs_core::services::rate_limiter::ChannelRateLimiter;
use modlogs_core::services::{
    DeduplicationGate, Dispatcher, HookCommandService, HookResolver, SubscriptionRegistry, UserService,
    WebhookService,
};

use crate::settings::Settings;

pub struct ServerContext {
    pub settings: Settings,
    pub db: Database,
    pub hooks: Arc<dyn HookRepository>,
    pub users: Arc<dyn UserRepository>,
    pub cache: Arc<dyn CacheStore>,
    pub twitch: Arc<dyn TwitchApi>,
    pub registry: Arc<SubscriptionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub discord: Arc<DiscordPlatform>,
    pub commands: Arc<HookCommandService>,
    /// Taken once by `take_app_state`; the router owns the only sender so
    /// the queue closes when the server stops.
    queue_tx: Option<mpsc::Sender<DispatchJob>>,
    pub queue_rx: Option<mpsc::Receiver<DispatchJob>>,
}

impl ServerContext {
    pub async fn new(settings: Settings) -> Result<Self, Error> {
        // 1) Postgres
        info!("Connecting to Postgres");
        let db = Database::new(&settings.database_url).await?;
        db.migrate().await?;
        let hooks: Arc<dyn HookRepository> = Arc::new(PostgresHookRepository::new(db.pool().clone()));
        let users: Arc<dyn UserRepository> = Arc::new(PostgresUserRepository::new(db.pool().clone()));

        // 2) Redis
        let cache: Arc<dyn CacheStore> = Arc::new(RedisStore::connect(&settings.redis_url).await?);

        // 3) Twitch
        let twitch: Arc<dyn TwitchApi> = Arc::new(HelixClient::new(HelixConfig::new(
            settings.twitch_client_id.clone(),
            settings.twitch_client_secret.clone(),
            settings.twitch_redirect_uri.clone(),
        ))?);

        // 4) Discord
        let discord = Arc::new(DiscordPlatform::new(settings.discord_bot_token.clone()));
        let chat: Arc<dyn ChatPlatform> = discord.clone();

        // 5) Pipeline
        let registry = Arc::new(SubscriptionRegistry::new(
            hooks.clone(),
            cache.clone(),
            twitch.clone(),
            settings.website_url.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            HookResolver::new(hooks.clone()),
            registry.clone(),
            cache.clone(),
            chat,
            Arc::new(ChannelRateLimiter::default()),
            DeduplicationGate::new(cache.clone()),
            settings.footer.clone(),
        ));
        let user_service = Arc::new(UserService::new(users.clone(), twitch.clone()));
        let commands = Arc::new(HookCommandService::new(
            hooks.clone(),
            cache.clone(),
            user_service,
            registry.clone(),
            settings.max_hooks_per_guild,
            settings.website_url.clone(),
        ));

        let (queue_tx, queue_rx) = mpsc::channel(settings.queue_capacity);

        Ok(Self {
            settings,
            db,
            hooks,
            users,
            cache,
            twitch,
            registry,
            dispatcher,
            discord,
            commands,
            queue_tx: Some(queue_tx),
            queue_rx: Some(queue_rx),
        })
    }

    /// State for the HTTP router. Can be taken once.
    pub fn take_app_state(&mut self) -> Option<AppState> {
        let queue = self.queue_tx.take()?;
        let webhooks = Arc::new(WebhookService::new(
            self.cache.clone(),
            DeduplicationGate::new(self.cache.clone()),
            queue,
        ));
        Some(AppState {
            webhooks,
            twitch: self.twitch.clone(),
            users: self.users.clone(),
            cache: self.cache.clone(),
            login: Arc::new(LoginConfig {
                client_id: self.settings.twitch_client_id.clone(),
                redirect_uri: self.settings.twitch_redirect_uri.clone(),
                authorize_url: AUTHORIZE_URL.to_string(),
                website_url: self.settings.website_url.clone(),
                invite_url: self.settings.discord_invite.clone(),
                cookie_domain: self.settings.cookie_domain.clone(),
            }),
        })
    }
}
