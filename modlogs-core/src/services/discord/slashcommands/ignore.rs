// File: modlogs-core/src/services/discord/slashcommands/ignore.rs

use twilight_model::application::command::CommandType;
use twilight_util::builder::command::{CommandBuilder, StringBuilder};

use super::{Invocation, SlashContext};
use crate::services::hook_commands::CommandReply;

pub fn create_ignore_command() -> CommandBuilder {
    CommandBuilder::new("ignore", "Ignore a user, such as a bot.", CommandType::ChatInput)
        .dm_permission(false)
        .option(StringBuilder::new("user", "The id or username of the twitch account.").required(true))
}

pub fn create_unignore_command() -> CommandBuilder {
    CommandBuilder::new("unignore", "Unignore a user that was previously ignored", CommandType::ChatInput)
        .dm_permission(false)
        .option(StringBuilder::new("user", "The id or username of the twitch account.").required(true))
}

pub fn create_ignored_command() -> CommandBuilder {
    CommandBuilder::new("ignored", "Shows a list of ignored users.", CommandType::ChatInput).dm_permission(false)
}

pub async fn handle_ignore(ctx: &SlashContext, inv: &Invocation<'_>) -> CommandReply {
    let user = inv.string_option("user").unwrap_or_default();
    ctx.commands.ignore(&inv.guild_id, user).await
}

pub async fn handle_unignore(ctx: &SlashContext, inv: &Invocation<'_>) -> CommandReply {
    let user = inv.string_option("user").unwrap_or_default();
    ctx.commands.unignore(&inv.guild_id, user).await
}

pub async fn handle_ignored(ctx: &SlashContext, inv: &Invocation<'_>) -> CommandReply {
    ctx.commands.ignored(&inv.guild_id).await
}
