// File: modlogs-common/src/models/hook.rs

use serde::{Deserialize, Serialize};

/// How notifications are rendered for a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookMode {
    /// One line of markdown; consecutive lines may be merged into one message.
    Minimal,
    /// One rich embed per event; never merged.
    Embed,
}

impl HookMode {
    pub fn as_i16(self) -> i16 {
        match self {
            HookMode::Minimal => 0,
            HookMode::Embed => 1,
        }
    }

    /// Unknown values fall back to embeds, the richer default.
    pub fn from_i16(value: i16) -> Self {
        match value {
            0 => HookMode::Minimal,
            _ => HookMode::Embed,
        }
    }
}

/// A registration binding a Discord channel to a streamer's moderation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    pub guild_id: String,
    pub channel_id: String,
    pub streamer_id: String,
    pub mode: HookMode,
}

impl Hook {
    pub fn target(&self) -> HookTarget {
        HookTarget {
            guild_id: self.guild_id.clone(),
            channel_id: self.channel_id.clone(),
            mode: self.mode,
        }
    }
}

/// Where one event gets delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookTarget {
    pub guild_id: String,
    pub channel_id: String,
    pub mode: HookMode,
}

impl HookTarget {
    pub fn into_hook(self, streamer_id: &str) -> Hook {
        Hook {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
            streamer_id: streamer_id.to_string(),
            mode: self.mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookUpsert {
    Created,
    Updated,
}
