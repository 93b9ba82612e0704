// File: modlogs-core/src/services/mod.rs

pub mod authorization;
pub mod dedup;
pub mod discord;
pub mod dispatcher;
pub mod hook_commands;
pub mod hook_resolver;
pub mod rate_limiter;
pub mod render;
pub mod subscription_registry;
pub mod user_service;
pub mod webhook_service;

pub use dedup::DeduplicationGate;
pub use dispatcher::{DispatchJob, Dispatcher};
pub use hook_commands::{CommandReply, HookCommandService};
pub use hook_resolver::HookResolver;
pub use rate_limiter::ChannelRateLimiter;
pub use subscription_registry::SubscriptionRegistry;
pub use user_service::UserService;
pub use webhook_service::WebhookService;
