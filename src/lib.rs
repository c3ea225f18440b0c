//! Bounded tweet collection, keyword streaming and tabular normalization
//! over the Twitter v1.1 API.
//!
//! - [`client::authenticate`] verifies credentials and yields a [`ClientHandle`].
//! - [`feeds`] walks cursor-paginated listings up to a requested count.
//! - [`stream`] appends filtered push messages to an append-only sink.
//! - [`table`] projects tweets into fixed columns for analysis.

pub mod client;
pub mod config;
pub mod error;
pub mod feeds;
pub mod oauth;
pub mod stream;
pub mod table;
pub mod ui;

pub use client::{authenticate, ClientHandle};
pub use config::{ApiConfig, Config, Credentials};
pub use error::{TweetError, TweetResult};
pub use feeds::{Fetched, Friend, Query, Record};
pub use stream::{FileSink, FilterSpec, Listener, Termination};
pub use table::{normalize, Row, Table};
