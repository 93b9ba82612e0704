// File: modlogs-core/src/platforms/mod.rs

pub mod discord;
pub mod twitch_eventsub;
pub mod twitch_helix;
