// File: modlogs-common/src/models/mod.rs
pub mod embed;
pub mod hook;
pub mod moderation;
pub mod subscription;
pub mod user;

pub use embed::{EmbedField, ModerationEmbed};
pub use hook::{Hook, HookMode, HookTarget, HookUpsert};
pub use moderation::{ModerationAction, ModerationEvent};
pub use subscription::{UpstreamSubscription, WebhookSecret};
pub use user::{TwitchUser, UserAccessToken};
