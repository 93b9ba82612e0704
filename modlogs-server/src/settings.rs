//! Validated runtime configuration built from the command line / environment.

use std::net::SocketAddr;

use tracing::warn;

use modlogs_core::Error;

use crate::Args;

/// Largest exit code a graceful shutdown may report.
const MAX_EXIT_CODE: i32 = 125;

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub redis_url: String,
    pub website_url: String,
    pub cookie_domain: Option<String>,
    pub twitch_client_id: String,
    pub twitch_client_secret: String,
    pub twitch_redirect_uri: String,
    pub discord_bot_token: String,
    pub discord_invite: String,
    pub max_hooks_per_guild: i64,
    pub rebuild_commands: bool,
    pub admins: Vec<String>,
    pub exit_code: i32,
    pub workers: usize,
    pub queue_capacity: usize,
    pub footer: String,
}

fn required(name: &str, value: String) -> Result<String, Error> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(Error::Config(format!("{name} must be set")));
    }
    Ok(value)
}

impl Settings {
    pub fn from_args(args: Args) -> Result<Self, Error> {
        let website_url = required("website_url", args.website_url)?
            .trim_end_matches('/')
            .to_string();

        let exit_code = if (0..=MAX_EXIT_CODE).contains(&args.exit_code) {
            args.exit_code
        } else {
            warn!(
                exit_code = args.exit_code,
                "Invalid exit code specified in config, using 0 as new exit code."
            );
            0
        };

        if args.max_hooks_per_guild < -1 {
            return Err(Error::Config(format!(
                "max_hooks_per_guild must be -1 or more, got {}",
                args.max_hooks_per_guild
            )));
        }

        let twitch_redirect_uri = args
            .twitch_redirect_uri
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| format!("{website_url}/login/callback"));

        Ok(Self {
            bind_addr: args.bind_addr.parse()?,
            database_url: required("database_url", args.database_url)?,
            redis_url: required("redis_url", args.redis_url)?,
            cookie_domain: args.cookie_domain.filter(|d| !d.trim().is_empty()),
            twitch_client_id: required("twitch_client_id", args.twitch_client_id)?,
            twitch_client_secret: required("twitch_client_secret", args.twitch_client_secret)?,
            twitch_redirect_uri,
            discord_bot_token: required("discord_bot_token", args.discord_bot_token)?,
            discord_invite: required("discord_invite", args.discord_invite)?,
            max_hooks_per_guild: args.max_hooks_per_guild,
            rebuild_commands: args.rebuild_commands,
            admins: args.admins.into_iter().filter(|a| !a.trim().is_empty()).collect(),
            exit_code,
            workers: args.workers.max(1),
            queue_capacity: args.queue_capacity.max(1),
            footer: args.footer,
            website_url,
        })
    }
}
