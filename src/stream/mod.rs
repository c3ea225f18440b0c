//! Keyword streaming into an append-only sink.
//!
//! [`Listener`] is a plain state machine; [`session::run`] owns the push
//! connection and feeds it one delimited message at a time.

pub mod session;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{TweetError, TweetResult};

pub use session::run;

/// Status the filter endpoint answers with when the client is throttled.
pub const RATE_LIMIT_STATUS: u16 = 420;

/// Keywords one session is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    keywords: Vec<String>,
}

impl FilterSpec {
    /// Trims, drops blanks and duplicates, keeps first-seen order.
    pub fn new<I, S>(keywords: I) -> TweetResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().trim();
            if !keyword.is_empty() && !unique.iter().any(|k| k == keyword) {
                unique.push(keyword.to_string());
            }
        }
        if unique.is_empty() {
            return Err(TweetError::Config("at least one keyword is required".into()));
        }
        Ok(Self { keywords: unique })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Value of the `track` form parameter.
    pub fn track(&self) -> String {
        self.keywords.join(",")
    }
}

/// Destination for raw streamed payloads.
pub trait Sink {
    /// Appends one payload in full, or fails without acknowledging it.
    fn append(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Where the payloads end up, for log lines.
    fn describe(&self) -> String;
}

/// Appends to a file, opening it per payload the way a shell `>>` would.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn append(&mut self, payload: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(payload)?;
        file.flush()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// What the driver should do after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `stop()` was called.
    Stopped,
    /// The remote answered with [`RATE_LIMIT_STATUS`].
    RateLimited,
    /// Any other error status.
    RemoteError { status: u16 },
    /// The remote closed the body.
    EndOfStream,
    /// The connection failed mid-stream.
    Disconnected,
}

impl Termination {
    /// Rate limits and remote errors become errors; the rest are clean endings.
    pub fn into_result(self) -> TweetResult<()> {
        match self {
            Self::RateLimited => Err(TweetError::RateLimited { retry_after: None }),
            Self::RemoteError { status } => Err(TweetError::Api {
                status,
                message: "stream closed by remote error".into(),
            }),
            Self::Stopped | Self::EndOfStream | Self::Disconnected => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Connecting,
    Streaming,
    Terminated(Termination),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub appended: u64,
    pub write_failures: u64,
}

pub struct Listener<S: Sink> {
    sink: S,
    state: ListenerState,
    stats: ListenerStats,
}

impl<S: Sink> Listener<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: ListenerState::Idle,
            stats: ListenerStats::default(),
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn stats(&self) -> ListenerStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, ListenerState::Terminated(_))
    }

    pub fn termination(&self) -> Option<Termination> {
        match self.state {
            ListenerState::Terminated(reason) => Some(reason),
            _ => None,
        }
    }

    /// Idle -> Connecting. Any other state is left alone.
    pub fn start(&mut self) {
        if self.state == ListenerState::Idle {
            info!(sink = %self.sink.describe(), "connecting");
            self.state = ListenerState::Connecting;
        }
    }

    /// Appends one inbound payload. A failed append is logged and skipped.
    pub fn handle_data(&mut self, raw: &[u8]) -> Decision {
        match self.state {
            ListenerState::Idle | ListenerState::Terminated(_) => return Decision::Stop,
            ListenerState::Connecting => {
                info!("streaming");
                self.state = ListenerState::Streaming;
            }
            ListenerState::Streaming => {}
        }

        match self.sink.append(raw) {
            Ok(()) => {
                self.stats.appended += 1;
                debug!(bytes = raw.len(), "payload appended");
            }
            Err(source) => {
                self.stats.write_failures += 1;
                let err = TweetError::SinkWrite {
                    path: PathBuf::from(self.sink.describe()),
                    source,
                };
                warn!(error = %err, "dropping payload");
            }
        }
        Decision::Continue
    }

    /// Every error status ends the session; 420 is reported as a rate limit.
    pub fn handle_error(&mut self, status: u16) -> Decision {
        if self.is_terminated() {
            return Decision::Stop;
        }
        let reason = if status == RATE_LIMIT_STATUS {
            warn!(status, "rate limited by stream endpoint");
            Termination::RateLimited
        } else {
            warn!(status, "stream endpoint returned an error");
            Termination::RemoteError { status }
        };
        self.state = ListenerState::Terminated(reason);
        Decision::Stop
    }

    /// Caller-initiated cancellation, valid from Connecting or Streaming.
    pub fn stop(&mut self) {
        if matches!(
            self.state,
            ListenerState::Connecting | ListenerState::Streaming
        ) {
            info!("stopping stream");
            self.state = ListenerState::Terminated(Termination::Stopped);
        }
    }

    pub(crate) fn end(&mut self, reason: Termination) {
        if !self.is_terminated() {
            info!(?reason, "stream ended");
            self.state = ListenerState::Terminated(reason);
        }
    }
}
