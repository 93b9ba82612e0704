// File: modlogs-core/src/platforms/discord/runtime.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{
    self as gateway, CloseFrame, Config, Event, EventTypeFlags, Intents, MessageSender, Shard, StreamExt,
};
use twilight_http::Client as HttpClient;
use twilight_http::client::ClientBuilder;
use twilight_http::error::ErrorType;
use twilight_model::channel::message::Embed;
use twilight_model::gateway::payload::incoming::InteractionCreate;
use twilight_model::id::Id;
use twilight_model::id::marker::{ApplicationMarker, ChannelMarker, GuildMarker};
use twilight_model::util::Timestamp;
use twilight_util::builder::embed::{EmbedBuilder, EmbedFieldBuilder, EmbedFooterBuilder};

use modlogs_common::models::ModerationEmbed;
use modlogs_common::traits::ChatPlatform;

use crate::Error;

/// Forwards interactions to `tx` and keeps the cache current.
async fn shard_runner(mut shard: Shard, tx: UnboundedSender<Box<InteractionCreate>>, cache: Arc<InMemoryCache>) {
    let shard_id = shard.id().number();
    info!(shard = shard_id, "Shard started");

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                error!(shard = shard_id, error = ?err, "Error receiving gateway event");
                continue;
            }
        };
        cache.update(&event);

        match event {
            Event::Ready(ready) => {
                info!(
                    shard = shard_id,
                    user = %ready.user.name,
                    guilds = ready.guilds.len(),
                    "Bot is up"
                );
            }
            Event::GuildCreate(_) | Event::GuildDelete(_) => {
                debug!(shard = shard_id, guild = ?event.guild_id(), kind = ?event.kind(), "Guild membership changed");
            }
            Event::InteractionCreate(interaction) => {
                if tx.send(interaction).is_err() {
                    warn!(shard = shard_id, "Interaction receiver dropped");
                }
            }
            other => trace!(shard = shard_id, kind = ?other.kind(), "Unhandled gateway event"),
        }
    }

    warn!(shard = shard_id, "Shard event loop ended");
}

/// Discord bot connection: REST client, guild cache and gateway shards.
pub struct DiscordPlatform {
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    token: String,
    rx: Mutex<Option<UnboundedReceiver<Box<InteractionCreate>>>>,
    shard_tasks: Mutex<Vec<JoinHandle<()>>>,
    shard_senders: Mutex<Vec<MessageSender>>,
}

impl DiscordPlatform {
    pub fn new(token: String) -> Self {
        let http = Arc::new(
            ClientBuilder::new()
                .token(token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );
        let cache = InMemoryCache::builder()
            .resource_types(ResourceType::GUILD | ResourceType::ROLE | ResourceType::CHANNEL)
            .build();
        Self {
            http,
            cache: Arc::new(cache),
            token,
            rx: Mutex::new(None),
            shard_tasks: Mutex::new(Vec::new()),
            shard_senders: Mutex::new(Vec::new()),
        }
    }

    pub fn http(&self) -> Arc<HttpClient> {
        self.http.clone()
    }

    pub fn cache(&self) -> Arc<InMemoryCache> {
        self.cache.clone()
    }

    pub async fn application_id(&self) -> Result<Id<ApplicationMarker>, Error> {
        let app = self
            .http
            .current_user_application()
            .await
            .map_err(|e| Error::Platform(format!("Failed to fetch application: {e}")))?
            .model()
            .await
            .map_err(|e| Error::Platform(format!("Failed to decode application: {e}")))?;
        Ok(app.id)
    }

    /// Opens the recommended number of shards.
    pub async fn connect(&self) -> Result<(), Error> {
        if self.token.is_empty() {
            return Err(Error::Auth("Discord token is empty".into()));
        }
        let mut senders = self.shard_senders.lock().await;
        if !senders.is_empty() {
            info!("Discord already connected");
            return Ok(());
        }

        let (tx, rx) = unbounded_channel();
        *self.rx.lock().await = Some(rx);

        let config = Config::new(self.token.clone(), Intents::GUILDS);
        let shards = gateway::create_recommended(&self.http, config, |_, b| b.build())
            .await
            .map_err(|e| Error::Platform(format!("create_recommended error: {e}")))?;

        let mut tasks = self.shard_tasks.lock().await;
        for shard in shards {
            senders.push(shard.sender());
            let tx = tx.clone();
            let cache = self.cache.clone();
            tasks.push(tokio::spawn(shard_runner(shard, tx, cache)));
        }
        info!(shards = tasks.len(), "Connected to Discord");
        Ok(())
    }

    pub async fn disconnect(&self) {
        let senders: Vec<MessageSender> = self.shard_senders.lock().await.drain(..).collect();
        for sender in &senders {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        let tasks: Vec<JoinHandle<()>> = self.shard_tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        *self.rx.lock().await = None;
        info!("Disconnected from Discord");
    }

    /// Next slash-command interaction; `None` once disconnected.
    pub async fn next_interaction(&self) -> Option<Box<InteractionCreate>> {
        let mut guard = self.rx.lock().await;
        match guard.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

fn parse_id<T>(raw: &str) -> Result<Id<T>, Error> {
    raw.parse::<u64>()
        .ok()
        .and_then(Id::new_checked)
        .ok_or_else(|| Error::InvalidInput(format!("Invalid Discord id: {raw}")))
}

/// Missing access and unknown channel both mean the destination is gone.
fn map_send_error(channel_id: &str, err: twilight_http::Error) -> Error {
    if let ErrorType::Response { status, .. } = err.kind() {
        if matches!(status.get(), 403 | 404) {
            return Error::DestinationUnavailable(format!("channel {channel_id}: HTTP {}", status.get()));
        }
    }
    Error::Platform(format!("Error sending Discord message: {err}"))
}

pub fn to_discord_embed(embed: &ModerationEmbed) -> Result<Embed, Error> {
    let timestamp = Timestamp::from_micros(embed.timestamp.timestamp_micros())
        .map_err(|e| Error::Platform(format!("Invalid embed timestamp: {e}")))?;
    let mut builder = EmbedBuilder::new()
        .title(embed.title.clone())
        .description(embed.description.clone())
        .color(embed.color)
        .timestamp(timestamp)
        .footer(EmbedFooterBuilder::new(embed.footer.clone()));
    for field in &embed.fields {
        let mut f = EmbedFieldBuilder::new(field.name.clone(), field.value.clone());
        if field.inline {
            f = f.inline();
        }
        builder = builder.field(f);
    }
    builder
        .validate()
        .map(EmbedBuilder::build)
        .map_err(|e| Error::Platform(format!("Invalid embed: {e}")))
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), Error> {
        let channel = parse_id::<ChannelMarker>(channel_id)?;
        self.http
            .create_message(channel)
            .content(content)
            .await
            .map_err(|e| map_send_error(channel_id, e))?;
        Ok(())
    }

    async fn send_embed(&self, channel_id: &str, embed: &ModerationEmbed) -> Result<(), Error> {
        let channel = parse_id::<ChannelMarker>(channel_id)?;
        let embed = to_discord_embed(embed)?;
        self.http
            .create_message(channel)
            .embeds(&[embed])
            .await
            .map_err(|e| map_send_error(channel_id, e))?;
        Ok(())
    }

    /// A cache hit is enough; otherwise the REST lookup decides, so hooks
    /// are not evicted while the cache is still filling after startup.
    async fn is_guild_member(&self, guild_id: &str) -> Result<bool, Error> {
        let guild = parse_id::<GuildMarker>(guild_id)?;
        if self.cache.guild(guild).is_some() {
            return Ok(true);
        }
        match self.http.guild(guild).await {
            Ok(_) => Ok(true),
            Err(e) => match e.kind() {
                ErrorType::Response { status, .. } if matches!(status.get(), 403 | 404) => Ok(false),
                _ => Err(Error::Platform(format!("Error fetching guild {guild_id}: {e}"))),
            },
        }
    }
}
