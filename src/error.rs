//! Error types shared by the fetcher, the streamer and the normalizer.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TweetError {
    /// Credentials are missing, malformed or were rejected by the remote.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The remote signalled throttling. Never retried internally.
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<u64> },

    /// A record is missing a field the upstream contract guarantees.
    #[error("malformed record: {0}")]
    Schema(String),

    /// Appending a payload to the sink failed.
    #[error("failed to append to {}: {source}", .path.display())]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other non-success status from the remote.
    #[error("Twitter API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", retry after {secs} seconds"),
        None => String::new(),
    }
}

impl TweetError {
    /// Suggested wait before the caller tries again, if the remote gave one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

pub type TweetResult<T> = Result<T, TweetError>;
