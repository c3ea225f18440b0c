use async_trait::async_trait;
use serde::Deserialize;

use super::{Cursor, Friend, Owner, Page, PageSource};
use crate::client::ClientHandle;
use crate::error::TweetResult;

const FRIENDS_LIST: &str = "/1.1/friends/list.json";

/// Sent on the first request; the remote answers `"0"` once the list is done.
const FIRST_CURSOR: &str = "-1";
const END_CURSOR: &str = "0";

/// Accounts an owner follows, walked with the v1.1 `cursor` parameter.
pub struct FriendsSource<'a> {
    handle: &'a ClientHandle,
    owner: Owner,
}

#[derive(Debug, Deserialize)]
struct FriendsPage {
    #[serde(default)]
    users: Vec<Friend>,
    #[serde(default)]
    next_cursor_str: Option<String>,
}

impl<'a> FriendsSource<'a> {
    pub fn new(handle: &'a ClientHandle, owner: &str) -> TweetResult<Self> {
        Ok(Self {
            handle,
            owner: Owner::parse(owner)?,
        })
    }
}

fn continuation(next_cursor: Option<String>) -> Option<Cursor> {
    next_cursor
        .filter(|c| !c.is_empty() && c != END_CURSOR)
        .map(Cursor::new)
}

#[async_trait]
impl PageSource for FriendsSource<'_> {
    type Item = Friend;

    fn page_limit(&self) -> usize {
        self.handle.page_size()
    }

    async fn fetch_page(&self, cursor: Option<&Cursor>, count: usize) -> TweetResult<Page<Friend>> {
        let params = vec![
            self.owner.param(),
            ("count".to_string(), count.to_string()),
            (
                "cursor".to_string(),
                cursor.map_or(FIRST_CURSOR, Cursor::as_str).to_string(),
            ),
            ("skip_status".to_string(), "true".to_string()),
            ("include_user_entities".to_string(), "false".to_string()),
        ];
        let page: FriendsPage = self.handle.get_json(FRIENDS_LIST, &params).await?;

        Ok(Page {
            items: page.users,
            next: continuation(page.next_cursor_str),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::test_handle;
    use crate::error::TweetError;
    use crate::feeds::{fetch, Fetched, Query};
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn user(id: &str, screen_name: &str) -> serde_json::Value {
        serde_json::json!({
            "id_str": id,
            "screen_name": screen_name,
            "name": screen_name.to_uppercase(),
            "followers_count": 10
        })
    }

    #[test]
    fn test_continuation() {
        assert_eq!(continuation(Some("0".into())), None);
        assert_eq!(continuation(Some(String::new())), None);
        assert_eq!(continuation(None), None);
        assert_eq!(
            continuation(Some("1489467234237774933".into())),
            Some(Cursor::new("1489467234237774933"))
        );
    }

    #[tokio::test]
    async fn test_friend_list_follows_cursor_until_zero() {
        let mock_server = MockServer::start().await;
        let handle = test_handle(&mock_server, 200, Some("nebula0087")).await;

        Mock::given(method("GET"))
            .and(path(FRIENDS_LIST))
            .and(query_param("screen_name", "nebula0087"))
            .and(query_param("cursor", "-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "users": [user("1", "alice"), user("2", "bob")],
                "next_cursor_str": "777"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(FRIENDS_LIST))
            .and(query_param("cursor", "777"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "users": [user("3", "carol")],
                "next_cursor_str": "0"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let friends = handle.friend_list(100).await.unwrap();
        let names: Vec<&str> = friends.iter().map(|f| f.screen_name.as_str()).collect();
        assert_eq!(names, ["alice", "bob", "carol"]);
        assert_eq!(friends[2].name, "CAROL");
    }

    #[tokio::test]
    async fn test_friend_list_truncates_to_max_items() {
        let mock_server = MockServer::start().await;
        let handle = test_handle(&mock_server, 200, None).await;

        Mock::given(method("GET"))
            .and(path(FRIENDS_LIST))
            .and(query_param("count", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "users": [user("1", "alice"), user("2", "bob")],
                "next_cursor_str": "777"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let query = Query::FriendList {
            owner: "nebula0087".into(),
        };
        match fetch(&handle, &query, 1).await.unwrap() {
            Fetched::Friends(friends) => {
                assert_eq!(friends.len(), 1);
                assert_eq!(friends[0].id, "1");
            }
            other => panic!("expected friends, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_friend_list_rate_limited() {
        let mock_server = MockServer::start().await;
        let handle = test_handle(&mock_server, 200, Some("nebula0087")).await;

        Mock::given(method("GET"))
            .and(path(FRIENDS_LIST))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let err = handle.friend_list(10).await.unwrap_err();
        assert!(matches!(err, TweetError::RateLimited { .. }));
    }
}
