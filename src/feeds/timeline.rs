use async_trait::async_trait;
use tracing::instrument;

use super::{Cursor, Owner, Page, PageSource, RawStatus, Record};
use crate::client::ClientHandle;
use crate::error::TweetResult;

const USER_TIMELINE: &str = "/1.1/statuses/user_timeline.json";
const HOME_TIMELINE: &str = "/1.1/statuses/home_timeline.json";

/// A status timeline, newest first. Pages are threaded with `max_id`: the
/// next page starts just below the oldest id seen so far.
pub struct TimelineSource<'a> {
    handle: &'a ClientHandle,
    endpoint: &'static str,
    owner: Option<Owner>,
}

impl<'a> TimelineSource<'a> {
    pub fn owner(handle: &'a ClientHandle, owner: &str) -> TweetResult<Self> {
        Ok(Self {
            handle,
            endpoint: USER_TIMELINE,
            owner: Some(Owner::parse(owner)?),
        })
    }

    pub fn home(handle: &'a ClientHandle) -> Self {
        Self {
            handle,
            endpoint: HOME_TIMELINE,
            owner: None,
        }
    }

    fn params(&self, cursor: Option<&Cursor>, count: usize) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(4);
        if let Some(owner) = &self.owner {
            params.push(owner.param());
        }
        params.push(("count".to_string(), count.to_string()));
        params.push(("tweet_mode".to_string(), "extended".to_string()));
        if let Some(cursor) = cursor {
            params.push(("max_id".to_string(), cursor.as_str().to_string()));
        }
        params
    }
}

/// Cursor for the page after one ending at `oldest_id`.
fn next_max_id(oldest_id: &str) -> Option<Cursor> {
    oldest_id
        .parse::<u64>()
        .ok()
        .and_then(|id| id.checked_sub(1))
        .filter(|id| *id > 0)
        .map(|id| Cursor::new(id.to_string()))
}

#[async_trait]
impl PageSource for TimelineSource<'_> {
    type Item = Record;

    fn page_limit(&self) -> usize {
        self.handle.page_size()
    }

    #[instrument(skip(self), fields(endpoint = self.endpoint))]
    async fn fetch_page(&self, cursor: Option<&Cursor>, count: usize) -> TweetResult<Page<Record>> {
        let params = self.params(cursor, count);
        let statuses: Vec<RawStatus> = self.handle.get_json(self.endpoint, &params).await?;

        let items = statuses
            .into_iter()
            .map(Record::try_from)
            .collect::<TweetResult<Vec<_>>>()?;
        let next = items.last().and_then(|r| next_max_id(&r.id));

        Ok(Page { items, next })
    }
}
