use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TweetError, TweetResult};

const ENV_CONSUMER_KEY: &str = "TWITTER_CONSUMER_KEY";
const ENV_CONSUMER_SECRET: &str = "TWITTER_CONSUMER_SECRET";
const ENV_ACCESS_TOKEN: &str = "TWITTER_ACCESS_TOKEN";
const ENV_ACCESS_TOKEN_SECRET: &str = "TWITTER_ACCESS_TOKEN_SECRET";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub api: ApiConfig,
}

/// OAuth 1.0a user-context secrets.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub consumer_key: String,
    #[serde(default)]
    pub consumer_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub access_token_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &redact(&self.consumer_key))
            .field("consumer_secret", &redact(&self.consumer_secret))
            .field("access_token", &redact(&self.access_token))
            .field("access_token_secret", &redact(&self.access_token_secret))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

impl Credentials {
    /// Returns the name of the first empty field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("access_token", &self.access_token),
            ("access_token_secret", &self.access_token_secret),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields = [
            (ENV_CONSUMER_KEY, &mut self.consumer_key),
            (ENV_CONSUMER_SECRET, &mut self.consumer_secret),
            (ENV_ACCESS_TOKEN, &mut self.access_token),
            (ENV_ACCESS_TOKEN_SECRET, &mut self.access_token_secret),
        ];
        for (var, field) in fields {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                *field = value;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_stream_url")]
    pub stream_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest item count asked for in a single page request.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_api_url() -> String {
    "https://api.twitter.com".into()
}

fn default_stream_url() -> String {
    "https://stream.twitter.com".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    200
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            stream_url: default_stream_url(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Loads the config file (or defaults when it does not exist), then
    /// applies credential overrides from the environment.
    pub fn load(path: Option<&Path>) -> TweetResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let mut config = Self::from_file(&path)?;
        config
            .credentials
            .apply_env(|var| std::env::var(var).ok());
        Ok(config)
    }

    pub fn default_path() -> TweetResult<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| TweetError::Config("could not determine config directory".into()))?;
        Ok(dir.join("tweetpipe").join("config.toml"))
    }

    fn from_file(path: &Path) -> TweetResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| TweetError::Config(format!("{}: {e}", path.display())))
    }
}
