// File: modlogs-core/src/test_utils/mod.rs

pub mod fakes;
pub mod memory;

pub use fakes::{FakeChatPlatform, FakeTwitchApi, SentMessage, SentPayload};
pub use memory::{MemoryCacheStore, MemoryHookRepository, MemoryUserRepository};
