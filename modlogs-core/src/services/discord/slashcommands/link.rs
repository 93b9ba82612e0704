// File: modlogs-core/src/services/discord/slashcommands/link.rs

use twilight_model::application::command::CommandType;
use twilight_util::builder::command::CommandBuilder;

use super::SlashContext;
use crate::services::hook_commands::CommandReply;

/// `/link` works everywhere, DMs included, and needs no permission.
pub fn create_link_command() -> CommandBuilder {
    CommandBuilder::new(
        "link",
        "Responds with the invite link and the login link.",
        CommandType::ChatInput,
    )
    .dm_permission(true)
}

pub fn handle_link(ctx: &SlashContext) -> CommandReply {
    ctx.commands.link()
}
