// File: modlogs-core/src/repositories/mod.rs
pub mod postgres;

pub use postgres::{PostgresHookRepository, PostgresUserRepository};
