// File: modlogs-core/src/services/discord/slashcommands/hooks.rs

use twilight_model::application::command::CommandType;
use twilight_model::channel::ChannelType;
use twilight_util::builder::command::{BooleanBuilder, ChannelBuilder, CommandBuilder, StringBuilder};

use super::{Invocation, SlashContext};
use crate::services::hook_commands::{AddHookRequest, CommandReply, INTERNAL_ERROR, UNLIMITED_HOOKS};

/// `/add token [minimal] [channel]`
pub fn create_add_command(max_hooks_per_guild: i64) -> CommandBuilder {
    let description = if max_hooks_per_guild == UNLIMITED_HOOKS {
        "Adds a new twitch moderation hook to log.".to_string()
    } else {
        format!("Adds a new twitch moderation hook to log. You can have a maximum of {max_hooks_per_guild}")
    };
    CommandBuilder::new("add", description, CommandType::ChatInput)
        .dm_permission(false)
        .option(StringBuilder::new("token", "Token from the login.").required(true))
        .option(BooleanBuilder::new("minimal", "Minimal mode."))
        .option(ChannelBuilder::new("channel", "Text channel for logging.").channel_types([ChannelType::GuildText]))
}

/// `/list [channel]`
pub fn create_list_command() -> CommandBuilder {
    CommandBuilder::new("list", "Shows a list of current hooks in this discord.", CommandType::ChatInput)
        .dm_permission(false)
        .option(ChannelBuilder::new("channel", "Show hooks for this channel.").channel_types([ChannelType::GuildText]))
}

/// `/delete broadcaster [channel]`
pub fn create_delete_command() -> CommandBuilder {
    CommandBuilder::new("delete", "Removes hooks for a broadcaster in this discord.", CommandType::ChatInput)
        .dm_permission(false)
        .option(StringBuilder::new("broadcaster", "The ID or name of the twitch streamer.").required(true))
        .option(
            ChannelBuilder::new("channel", "Text channel where the hook is active.")
                .channel_types([ChannelType::GuildText]),
        )
}

pub async fn handle_add(ctx: &SlashContext, inv: &Invocation<'_>) -> CommandReply {
    let Some(token) = inv.string_option("token") else {
        return CommandReply::private("Please provide the token from the login page.");
    };
    let Some(channel) = inv.channel_option("channel").or_else(|| inv.invoking_channel()) else {
        return CommandReply::private(INTERNAL_ERROR);
    };
    ctx.commands
        .add(AddHookRequest {
            guild_id: inv.guild_id.clone(),
            channel,
            token: token.to_string(),
            minimal: inv.bool_option("minimal"),
        })
        .await
}

pub async fn handle_list(ctx: &SlashContext, inv: &Invocation<'_>) -> CommandReply {
    let channel = inv.channel_option("channel");
    ctx.commands.list(&inv.guild_id, channel.as_ref()).await
}

pub async fn handle_delete(ctx: &SlashContext, inv: &Invocation<'_>) -> CommandReply {
    let Some(broadcaster) = inv.string_option("broadcaster") else {
        return CommandReply::private("Please enter a valid broadcaster.");
    };
    let channel = inv.channel_option("channel");
    ctx.commands.delete(&inv.guild_id, broadcaster, channel.as_ref()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_command_options() {
        let cmd = create_add_command(10).build();
        let opts: Vec<(String, bool)> = cmd
            .options
            .iter()
            .map(|o| (o.name.clone(), o.required.unwrap_or(false)))
            .collect();
        assert_eq!(
            opts,
            vec![
                ("token".to_string(), true),
                ("minimal".to_string(), false),
                ("channel".to_string(), false),
            ]
        );
        assert!(cmd.description.ends_with("maximum of 10"));
    }

    #[test]
    fn test_unlimited_add_description() {
        let cmd = create_add_command(UNLIMITED_HOOKS).build();
        assert!(!cmd.description.contains("maximum"));
    }
}
