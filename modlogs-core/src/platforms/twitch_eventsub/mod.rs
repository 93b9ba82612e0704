// File: modlogs-core/src/platforms/twitch_eventsub/mod.rs

pub mod events;
pub mod signature;

pub use events::{CallbackEnvelope, NormalizeError, SubscriptionInfo, normalize};
