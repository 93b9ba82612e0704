// File: modlogs-core/src/services/discord/mod.rs

pub mod slashcommands;

pub use slashcommands::{SlashContext, handle_interaction_create};
