// File: modlogs-core/src/services/discord/slashcommands/mod.rs

pub mod hooks;
pub mod ignore;
pub mod link;

use std::sync::Arc;

use tracing::{debug, error, warn};
use twilight_cache_inmemory::InMemoryCache;
use twilight_http::Client as HttpClient;
use twilight_model::{
    application::{
        command::Command,
        interaction::{
            Interaction, InteractionData,
            application_command::{CommandData, CommandOptionValue},
        },
    },
    channel::{ChannelType, message::MessageFlags},
    gateway::payload::incoming::InteractionCreate,
    guild::Permissions,
    http::interaction::{InteractionResponse, InteractionResponseType},
    id::{
        Id,
        marker::{ApplicationMarker, GuildMarker},
    },
};
use twilight_util::builder::InteractionResponseDataBuilder;

use crate::Error;
use crate::services::authorization::{GuildSnapshot, RoleSnapshot, is_authorized};
use crate::services::hook_commands::{ChannelRef, CommandReply, HookCommandService};

const NO_PERMISSION: &str = "You do not have permission to execute that command.";
const GUILD_UNAVAILABLE: &str = "Internal Server Error. Please try again later...";

/// Everything a slash command handler needs.
pub struct SlashContext {
    pub http: Arc<HttpClient>,
    pub cache: Arc<InMemoryCache>,
    pub application_id: Id<ApplicationMarker>,
    pub commands: Arc<HookCommandService>,
    pub admins: Vec<String>,
}

pub fn all_commands(max_hooks_per_guild: i64) -> Vec<Command> {
    vec![
        hooks::create_add_command(max_hooks_per_guild).build(),
        hooks::create_list_command().build(),
        hooks::create_delete_command().build(),
        ignore::create_ignore_command().build(),
        ignore::create_unignore_command().build(),
        ignore::create_ignored_command().build(),
        link::create_link_command().build(),
    ]
}

pub async fn register_global_slash_commands(
    http: &HttpClient,
    application_id: Id<ApplicationMarker>,
    max_hooks_per_guild: i64,
) -> Result<(), Error> {
    let commands = all_commands(max_hooks_per_guild);
    http.interaction(application_id)
        .set_global_commands(&commands)
        .await
        .map_err(|e| Error::Platform(format!("Failed to register global slash commands: {e}")))?;
    Ok(())
}

/// Removes every global command this application registered.
pub async fn clear_global_slash_commands(
    http: &HttpClient,
    application_id: Id<ApplicationMarker>,
) -> Result<(), Error> {
    http.interaction(application_id)
        .set_global_commands(&[])
        .await
        .map_err(|e| Error::Platform(format!("Failed to clear global slash commands: {e}")))?;
    Ok(())
}

/// Dispatch slash commands from an `InteractionCreate`.
pub async fn handle_interaction_create(ctx: Arc<SlashContext>, event: Box<InteractionCreate>) {
    let interaction = &event.0;
    let Some(InteractionData::ApplicationCommand(data)) = &interaction.data else {
        return;
    };
    let name = data.name.as_str();
    debug!(command = name, "Received slash command");

    let reply = match name {
        "link" => link::handle_link(&ctx),
        "add" | "list" | "delete" | "ignore" | "unignore" | "ignored" => {
            match authorize(&ctx, interaction) {
                Ok(guild_id) => {
                    let invocation = Invocation {
                        interaction,
                        data,
                        guild_id: guild_id.to_string(),
                    };
                    match name {
                        "add" => hooks::handle_add(&ctx, &invocation).await,
                        "list" => hooks::handle_list(&ctx, &invocation).await,
                        "delete" => hooks::handle_delete(&ctx, &invocation).await,
                        "ignore" => ignore::handle_ignore(&ctx, &invocation).await,
                        "unignore" => ignore::handle_unignore(&ctx, &invocation).await,
                        _ => ignore::handle_ignored(&ctx, &invocation).await,
                    }
                }
                Err(reply) => reply,
            }
        }
        other => CommandReply::private(format!("Unrecognized command: {other}")),
    };

    if let Err(e) = respond(&ctx, interaction, reply).await {
        error!(command = name, error = %e, "Failed to respond to interaction");
    }
}

/// A parsed command invocation inside a guild.
pub struct Invocation<'a> {
    pub interaction: &'a Interaction,
    pub data: &'a CommandData,
    pub guild_id: String,
}

impl Invocation<'_> {
    pub fn string_option(&self, name: &str) -> Option<&str> {
        self.data.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
            CommandOptionValue::String(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn bool_option(&self, name: &str) -> Option<bool> {
        self.data.options.iter().find(|o| o.name == name).and_then(|o| match o.value {
            CommandOptionValue::Boolean(b) => Some(b),
            _ => None,
        })
    }

    /// The channel picked in option `name`, with its type from the resolved data.
    pub fn channel_option(&self, name: &str) -> Option<ChannelRef> {
        let id = self.data.options.iter().find(|o| o.name == name).and_then(|o| match o.value {
            CommandOptionValue::Channel(id) => Some(id),
            _ => None,
        })?;
        let kind = self
            .data
            .resolved
            .as_ref()
            .and_then(|r| r.channels.get(&id))
            .map(|c| c.kind);
        Some(ChannelRef {
            id: id.to_string(),
            is_text: kind == Some(ChannelType::GuildText),
        })
    }

    /// The channel the command was typed in.
    pub fn invoking_channel(&self) -> Option<ChannelRef> {
        self.interaction.channel.as_ref().map(|c| ChannelRef {
            id: c.id.to_string(),
            is_text: c.kind == ChannelType::GuildText,
        })
    }
}

/// Guild owner, configured admin, or Administrator role. The guild must be
/// in the cache.
fn authorize(ctx: &SlashContext, interaction: &Interaction) -> Result<Id<GuildMarker>, CommandReply> {
    let Some(guild_id) = interaction.guild_id else {
        return Err(CommandReply::private("This command can only be used in a server."));
    };
    let Some(snapshot) = guild_snapshot(&ctx.cache, guild_id) else {
        warn!(guild = %guild_id, "Guild missing from cache");
        return Err(CommandReply::private(GUILD_UNAVAILABLE));
    };
    let Some(actor) = interaction.author_id() else {
        return Err(CommandReply::private(NO_PERMISSION));
    };
    let member_roles: Vec<String> = interaction
        .member
        .as_ref()
        .map(|m| m.roles.iter().map(|r| r.to_string()).collect())
        .unwrap_or_default();

    if is_authorized(&actor.to_string(), &snapshot, &member_roles, &ctx.admins) {
        Ok(guild_id)
    } else {
        Err(CommandReply::private(NO_PERMISSION))
    }
}

fn guild_snapshot(cache: &InMemoryCache, guild_id: Id<GuildMarker>) -> Option<GuildSnapshot> {
    let owner_id = cache.guild(guild_id)?.owner_id().to_string();
    let roles = cache
        .guild_roles(guild_id)
        .map(|ids| {
            ids.iter()
                .filter_map(|role_id| {
                    cache.role(*role_id).map(|role| RoleSnapshot {
                        id: role_id.to_string(),
                        administrator: role.resource().permissions.contains(Permissions::ADMINISTRATOR),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Some(GuildSnapshot { owner_id, roles })
}

async fn respond(ctx: &SlashContext, interaction: &Interaction, reply: CommandReply) -> Result<(), Error> {
    let mut data = InteractionResponseDataBuilder::new().content(reply.content);
    if reply.ephemeral {
        data = data.flags(MessageFlags::EPHEMERAL);
    }
    ctx.http
        .interaction(ctx.application_id)
        .create_response(
            interaction.id,
            &interaction.token,
            &InteractionResponse {
                kind: InteractionResponseType::ChannelMessageWithSource,
                data: Some(data.build()),
            },
        )
        .await
        .map_err(|e| Error::Platform(format!("Error responding to interaction: {e}")))?;
    Ok(())
}
