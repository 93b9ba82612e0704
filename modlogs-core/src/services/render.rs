// File: modlogs-core/src/services/render.rs

use modlogs_common::models::{EmbedField, ModerationAction, ModerationEmbed, ModerationEvent};

pub const BAN_COLOR: u32 = 13632027;
pub const UNBAN_COLOR: u32 = 8311585;
pub const MOD_COLOR: u32 = 9442302;
pub const UNMOD_COLOR: u32 = 16312092;

const EXPIRES_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Both renderings of one event; every destination picks the one its hook
/// mode asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEvent {
    pub embed: ModerationEmbed,
    pub minimal: String,
}

fn field(name: &str, value: &str) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.to_string(),
        inline: false,
    }
}

pub fn title(event: &ModerationEvent) -> &'static str {
    match event.action {
        ModerationAction::Ban if event.is_timeout() => "User Timeout Event",
        ModerationAction::Ban => "User Ban Event",
        ModerationAction::Unban => "User Unban Event",
        ModerationAction::ModeratorAdd => "User Mod Event",
        ModerationAction::ModeratorRemove => "User Unmod Event",
    }
}

/// The chat command equivalent of the action, e.g. `timeout user 601 spam`.
pub fn command(event: &ModerationEvent) -> String {
    let user = &event.target_user_name;
    match event.action {
        ModerationAction::Ban => {
            let mut cmd = match event.timeout_seconds() {
                Some(secs) => format!("timeout {user} {secs}"),
                None => format!("ban {user}"),
            };
            if let Some(reason) = event.reason.as_deref().filter(|r| !r.is_empty()) {
                cmd.push(' ');
                cmd.push_str(reason);
            }
            cmd
        }
        ModerationAction::Unban => format!("unban {user}"),
        ModerationAction::ModeratorAdd => format!("mod {user}"),
        ModerationAction::ModeratorRemove => format!("unmod {user}"),
    }
}

pub fn render_embed(event: &ModerationEvent, footer: &str) -> ModerationEmbed {
    let moderator = event.moderator_name.as_deref().unwrap_or_default();
    let mut fields = vec![field("Broadcaster", &event.broadcaster_name)];

    let color = match event.action {
        ModerationAction::Ban => {
            let reason = event
                .reason
                .as_deref()
                .filter(|r| !r.is_empty())
                .unwrap_or("None Provided");
            fields.push(field("User", &event.target_user_name));
            fields.push(field("Moderator", moderator));
            fields.push(field("Reason", reason));
            if let Some(expires_at) = event.expires_at {
                fields.push(field("Expires", &expires_at.format(EXPIRES_FORMAT).to_string()));
            }
            BAN_COLOR
        }
        ModerationAction::Unban => {
            fields.push(field("User", &event.target_user_name));
            fields.push(field("Moderator", moderator));
            UNBAN_COLOR
        }
        ModerationAction::ModeratorAdd => {
            fields.push(field("User", &event.target_user_name));
            MOD_COLOR
        }
        ModerationAction::ModeratorRemove => {
            fields.push(field("User", &event.target_user_name));
            UNMOD_COLOR
        }
    };

    ModerationEmbed {
        title: title(event).to_string(),
        description: "_ _".to_string(),
        color,
        timestamp: event.created_at,
        footer: footer.to_string(),
        fields,
    }
}

pub fn render_minimal(event: &ModerationEvent) -> String {
    format!(
        "**{}: #{}** - `{}` executed `/{}`",
        title(event),
        event.broadcaster_name,
        event.acting_user_name().replace('`', ""),
        command(event).replace('`', ""),
    )
}

pub fn render(event: &ModerationEvent, footer: &str) -> RenderedEvent {
    RenderedEvent {
        embed: render_embed(event, footer),
        minimal: render_minimal(event),
    }
}
