use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

mod context;
mod server;
mod settings;

use settings::Settings;

#[derive(Parser, Debug, Clone)]
#[command(name = "modlogs")]
#[command(author, version, about = "ModLogs - relays Twitch moderation events into Discord channels")]
pub struct Args {
    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: String,

    /// Postgres connection URL
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://modlogs@localhost:5432/modlogs")]
    pub database_url: String,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Public base URL of this service; webhook callbacks are built from it
    #[arg(long, env = "WEBSITE_URL", default_value = "")]
    pub website_url: String,

    /// Domain for the login state cookie
    #[arg(long, env = "COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    #[arg(long, env = "TWITCH_CLIENT_ID", default_value = "")]
    pub twitch_client_id: String,

    #[arg(long, env = "TWITCH_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub twitch_client_secret: String,

    /// OAuth redirect URI; defaults to `<website_url>/login/callback`
    #[arg(long, env = "TWITCH_REDIRECT_URI")]
    pub twitch_redirect_uri: Option<String>,

    #[arg(long, env = "DISCORD_BOT_TOKEN", default_value = "", hide_env_values = true)]
    pub discord_bot_token: String,

    /// Invite URL for the Discord bot
    #[arg(long, env = "DISCORD_INVITE", default_value = "")]
    pub discord_invite: String,

    /// Max number of hooks per guild, -1 for unlimited
    #[arg(long, env = "MAX_HOOKS_PER_GUILD", default_value_t = 10, allow_hyphen_values = true)]
    pub max_hooks_per_guild: i64,

    /// Register the slash commands on startup and remove them on shutdown
    #[arg(long, env = "REBUILD_COMMANDS", default_value = "false")]
    pub rebuild_commands: bool,

    /// Discord user ids of global bot admins
    #[arg(long, env = "ADMINS", value_delimiter = ',')]
    pub admins: Vec<String>,

    /// Status code for a graceful shutdown, [0-125]
    #[arg(long, env = "EXIT_CODE", default_value_t = 0, allow_hyphen_values = true)]
    pub exit_code: i32,

    /// Number of dispatch workers draining the event queue
    #[arg(long, env = "DISPATCH_WORKERS", default_value_t = 4)]
    pub workers: usize,

    #[arg(long, env = "DISPATCH_QUEUE_CAPACITY", default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Footer text on every embed
    #[arg(long, env = "EMBED_FOOTER", default_value = "ModLogs")]
    pub footer: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub level: String,
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.level)?;
    info!("Application starting...");

    let settings = Settings::from_args(args)?;
    let exit_code = settings.exit_code;

    if let Err(e) = server::run_server(settings).await {
        error!("Server error: {:?}", e);
        return Err(e.into());
    }

    info!("Main finished. Goodbye!");
    std::process::exit(exit_code);
}
