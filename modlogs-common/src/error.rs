// ================================================================
// File: modlogs-common/src/error.rs
// ================================================================

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cache store error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A non-success response from the Twitch API.
    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("{0}")]
    Aggregate(AggregateError),

    /// The chat destination is gone or no longer reachable by the bot.
    #[error("Destination unavailable: {0}")]
    DestinationUnavailable(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("Event queue closed")]
    QueueClosed,
}

impl Error {
    /// True for the 401 the Twitch API returns when an app token went stale.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Upstream { status: 401, .. })
    }
}

/// Every failure from a fan-out over several independent upstream calls.
#[derive(Debug, Default)]
pub struct AggregateError {
    pub errors: Vec<Error>,
}

impl AggregateError {
    pub fn push(&mut self, err: Error) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing failed, the single error when one did,
    /// and the aggregate otherwise.
    pub fn into_result(mut self) -> Result<(), Error> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(Error::Aggregate(self)),
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n\t* {err}")?;
        }
        Ok(())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<chrono::format::ParseError> for Error {
    fn from(err: chrono::format::ParseError) -> Self {
        Error::Parse(err.to_string())
    }
}
