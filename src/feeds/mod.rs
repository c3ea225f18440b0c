pub mod friends;
pub mod timeline;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ClientHandle;
use crate::error::{TweetError, TweetResult};

pub use friends::FriendsSource;
pub use timeline::TimelineSource;

/// v1.1 `created_at` layout, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// One fetched tweet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub source: String,
    pub like_count: u64,
    pub retweet_count: u64,
}

/// One account from a friend list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    #[serde(rename = "id_str")]
    pub id: String,
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub followers_count: u64,
}

/// Status object as the REST and streaming endpoints send it. Every field
/// is optional here so a missing one surfaces as a schema error instead of
/// a generic decode failure.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawStatus {
    #[serde(default)]
    id_str: Option<String>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    extended_tweet: Option<ExtendedTweet>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    favorite_count: Option<u64>,
    #[serde(default)]
    retweet_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ExtendedTweet {
    full_text: String,
}

fn missing(field: &str) -> TweetError {
    TweetError::Schema(format!("missing field `{field}`"))
}

impl TryFrom<RawStatus> for Record {
    type Error = TweetError;

    fn try_from(raw: RawStatus) -> TweetResult<Self> {
        let id = raw
            .id_str
            .or_else(|| raw.id.map(|id| id.to_string()))
            .ok_or_else(|| missing("id_str"))?;

        // Streamed tweets over 140 characters carry the full text in `extended_tweet`.
        let text = raw
            .extended_tweet
            .map(|ext| ext.full_text)
            .or(raw.full_text)
            .or(raw.text)
            .ok_or_else(|| missing("text"))?;

        let created_at = raw.created_at.ok_or_else(|| missing("created_at"))?;
        let created_at = DateTime::parse_from_str(&created_at, CREATED_AT_FORMAT)
            .map_err(|e| TweetError::Schema(format!("bad `created_at` {created_at:?}: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            id,
            text,
            created_at,
            source: raw.source.ok_or_else(|| missing("source"))?,
            like_count: raw.favorite_count.ok_or_else(|| missing("favorite_count"))?,
            retweet_count: raw.retweet_count.ok_or_else(|| missing("retweet_count"))?,
        })
    }
}

impl Record {
    pub fn from_value(value: serde_json::Value) -> TweetResult<Self> {
        let raw: RawStatus = serde_json::from_value(value)?;
        raw.try_into()
    }
}

/// Opaque continuation token handed back by a page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One round-trip of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` once the source has nothing further.
    pub next: Option<Cursor>,
}

/// A cursor-paginated listing on the remote.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Largest count one request may ask for.
    fn page_limit(&self) -> usize;

    /// Fetches up to `count` items starting at `cursor` (`None` on the first call).
    async fn fetch_page(&self, cursor: Option<&Cursor>, count: usize)
        -> TweetResult<Page<Self::Item>>;
}

struct Walk {
    cursor: Option<Cursor>,
    remaining: usize,
    done: bool,
}

/// Lazily walks `source` until `max_items` items were produced, a page
/// comes back empty, or no continuation cursor is returned.
///
/// Each request asks for at most the number of items still missing. An
/// error ends the stream after being yielded. Nothing is kept between
/// calls, so restarting means calling this again.
pub fn paginate<S: PageSource>(
    source: &S,
    max_items: usize,
) -> impl Stream<Item = TweetResult<S::Item>> + '_ {
    let walk = Walk {
        cursor: None,
        remaining: max_items,
        done: false,
    };

    stream::try_unfold(walk, move |mut walk| async move {
        if walk.done || walk.remaining == 0 {
            return Ok(None);
        }

        let count = walk.remaining.min(source.page_limit().max(1));
        let page = source.fetch_page(walk.cursor.as_ref(), count).await?;
        let mut items = page.items;
        if items.is_empty() {
            debug!("source exhausted");
            return Ok(None);
        }

        items.truncate(walk.remaining);
        walk.remaining -= items.len();
        walk.done = page.next.is_none();
        walk.cursor = page.next;
        debug!(
            received = items.len(),
            remaining = walk.remaining,
            "page fetched"
        );

        Ok::<_, TweetError>(Some((items, walk)))
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, TweetError>)))
    .try_flatten()
}

/// Eager form of [`paginate`].
pub async fn collect<S: PageSource>(source: &S, max_items: usize) -> TweetResult<Vec<S::Item>> {
    paginate(source, max_items).try_collect().await
}

/// Which listing to walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    OwnerTimeline { owner: String },
    FriendList { owner: String },
    HomeFeed,
}

/// How an owner string addresses an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Id(String),
    ScreenName(String),
}

impl Owner {
    /// A leading `@` always means a screen name. Otherwise all-digit
    /// strings are ids and anything else a screen name.
    pub fn parse(owner: &str) -> TweetResult<Self> {
        let owner = owner.trim();
        let (owner, explicit_name) = match owner.strip_prefix('@') {
            Some(name) => (name.trim(), true),
            None => (owner, false),
        };
        if owner.is_empty() {
            return Err(TweetError::Config("owner must not be empty".into()));
        }
        if !explicit_name && owner.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self::Id(owner.to_string()))
        } else {
            Ok(Self::ScreenName(owner.to_string()))
        }
    }

    pub(crate) fn param(&self) -> (String, String) {
        match self {
            Self::Id(id) => ("user_id".to_string(), id.clone()),
            Self::ScreenName(name) => ("screen_name".to_string(), name.clone()),
        }
    }
}

/// Items produced by [`fetch`].
#[derive(Debug, Clone)]
pub enum Fetched {
    Records(Vec<Record>),
    Friends(Vec<Friend>),
}

impl Fetched {
    pub fn len(&self) -> usize {
        match self {
            Self::Records(records) => records.len(),
            Self::Friends(friends) => friends.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn fetch(handle: &ClientHandle, query: &Query, max_items: usize) -> TweetResult<Fetched> {
    match query {
        Query::FriendList { .. } => fetch_friends(handle, query, max_items)
            .await
            .map(Fetched::Friends),
        _ => fetch_records(handle, query, max_items)
            .await
            .map(Fetched::Records),
    }
}

pub async fn fetch_records(
    handle: &ClientHandle,
    query: &Query,
    max_items: usize,
) -> TweetResult<Vec<Record>> {
    match query {
        Query::OwnerTimeline { owner } => {
            collect(&TimelineSource::owner(handle, owner)?, max_items).await
        }
        Query::HomeFeed => collect(&TimelineSource::home(handle), max_items).await,
        Query::FriendList { .. } => Err(TweetError::Config(
            "a friend list yields accounts, not tweets".into(),
        )),
    }
}

pub async fn fetch_friends(
    handle: &ClientHandle,
    query: &Query,
    max_items: usize,
) -> TweetResult<Vec<Friend>> {
    match query {
        Query::FriendList { owner } => {
            collect(&FriendsSource::new(handle, owner)?, max_items).await
        }
        _ => Err(TweetError::Config("only a friend list yields accounts".into())),
    }
}
