// File: modlogs-common/src/traits/mod.rs
pub mod api;
pub mod repository_traits;
pub mod store_traits;

pub use api::{ChatPlatform, CreateSubscription, TwitchApi};
pub use repository_traits::{HookRepository, UserRepository};
pub use store_traits::{CacheStore, ClaimOutcome};
