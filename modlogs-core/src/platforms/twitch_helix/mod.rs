pub mod client;
pub mod token;

pub use client::{HelixClient, HelixConfig};
pub use token::{AppToken, ClientCredentials, TokenCache, TokenSource};
