// src/lib.rs

pub mod cache;
pub mod db;
pub mod platforms;
pub mod repositories;
pub mod server;
pub mod services;
pub mod tasks;
pub mod test_utils;
pub mod utils;

pub use db::Database;
pub use modlogs_common::error::Error;
