//! Authenticated session against the Twitter v1.1 REST API.

use std::sync::Arc;

use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::config::{ApiConfig, Credentials};
use crate::error::{TweetError, TweetResult};
use crate::feeds::{self, Friend, Query, Record};
use crate::oauth::{encode_params, OAuthSigner};

const VERIFY_CREDENTIALS: &str = "/1.1/account/verify_credentials.json";

/// The account the credentials belong to, as reported by the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id_str: String,
    pub screen_name: String,
}

/// A verified session. Clones share the same HTTP connection pool and
/// signer; nothing in the handle changes after `authenticate` returns.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    stream_http: Client,
    signer: OAuthSigner,
    api_url: String,
    stream_url: String,
    page_size: usize,
    account: Account,
    target_user: Option<String>,
}

/// Validates the credentials, verifies them against the remote and returns
/// the session handle.
#[instrument(skip(api, credentials))]
pub async fn authenticate(
    api: &ApiConfig,
    credentials: &Credentials,
    target_user: Option<String>,
) -> TweetResult<ClientHandle> {
    if let Some(field) = credentials.missing_field() {
        return Err(TweetError::Auth(format!("credential `{field}` is empty")));
    }
    if api.page_size == 0 {
        return Err(TweetError::Config("page_size must be at least 1".into()));
    }

    let user_agent = format!("tweetpipe/{}", env!("CARGO_PKG_VERSION"));
    let http = Client::builder()
        .timeout(api.timeout())
        .user_agent(user_agent.clone())
        .build()?;
    // The push connection stays open indefinitely, so it gets no overall timeout.
    let stream_http = Client::builder().user_agent(user_agent).build()?;

    let signer = OAuthSigner::new(credentials);
    let api_url = api.api_url.trim_end_matches('/').to_string();

    let url = format!("{api_url}{VERIFY_CREDENTIALS}");
    let auth = signer.sign("GET", &url, &[])?;
    let response = http
        .get(&url)
        .header(header::AUTHORIZATION, auth)
        .send()
        .await?;
    let account: Account = read_json(response).await?;

    info!(screen_name = %account.screen_name, "authenticated");

    Ok(ClientHandle {
        inner: Arc::new(Inner {
            http,
            stream_http,
            signer,
            api_url,
            stream_url: api.stream_url.trim_end_matches('/').to_string(),
            page_size: api.page_size,
            account,
            target_user,
        }),
    })
}

impl ClientHandle {
    pub fn account(&self) -> &Account {
        &self.inner.account
    }

    pub fn target_user(&self) -> Option<&str> {
        self.inner.target_user.as_deref()
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    /// Signed GET against the REST host.
    #[instrument(skip(self, params), fields(params = params.len()))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> TweetResult<T> {
        let url = format!("{}{}", self.inner.api_url, endpoint);
        let auth = self.inner.signer.sign("GET", &url, params)?;

        let full_url = if params.is_empty() {
            url
        } else {
            format!("{url}?{}", encode_params(params))
        };
        debug!(url = %full_url, "requesting page");

        let response = self
            .inner
            .http
            .get(&full_url)
            .header(header::AUTHORIZATION, auth)
            .send()
            .await?;
        read_json(response).await
    }

    /// Signed form POST against the streaming host. The raw response is
    /// returned so the caller can inspect the status and read the body
    /// incrementally.
    pub async fn open_stream(
        &self,
        endpoint: &str,
        form: &[(String, String)],
    ) -> TweetResult<Response> {
        let url = format!("{}{}", self.inner.stream_url, endpoint);
        let auth = self.inner.signer.sign("POST", &url, form)?;
        debug!(url = %url, "opening stream");

        let response = self
            .inner
            .stream_http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encode_params(form))
            .send()
            .await?;
        Ok(response)
    }

    fn require_target(&self) -> TweetResult<String> {
        self.target_user()
            .map(str::to_string)
            .ok_or_else(|| TweetError::Config("no target user set on this client".into()))
    }

    /// Most recent tweets of the target user.
    pub async fn user_timeline(&self, max_items: usize) -> TweetResult<Vec<Record>> {
        let owner = self.require_target()?;
        feeds::fetch_records(self, &Query::OwnerTimeline { owner }, max_items).await
    }

    /// Accounts the target user follows.
    pub async fn friend_list(&self, max_items: usize) -> TweetResult<Vec<Friend>> {
        let owner = self.require_target()?;
        feeds::fetch_friends(self, &Query::FriendList { owner }, max_items).await
    }

    /// Home feed of the authenticated account.
    pub async fn home_timeline(&self, max_items: usize) -> TweetResult<Vec<Record>> {
        feeds::fetch_records(self, &Query::HomeFeed, max_items).await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps the status to the error taxonomy and decodes successful bodies.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> TweetResult<T> {
    let status = response.status();
    let retry_after = reset_hint(response.headers());
    let bytes = response.bytes().await?;

    if status.is_success() {
        return serde_json::from_slice(&bytes).map_err(TweetError::from);
    }

    let message = error_message(&bytes);
    match status {
        StatusCode::UNAUTHORIZED => Err(TweetError::Auth(message)),
        StatusCode::TOO_MANY_REQUESTS => Err(TweetError::RateLimited { retry_after }),
        _ => Err(TweetError::Api {
            status: status.as_u16(),
            message,
        }),
    }
}

fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .iter()
            .map(|e| match (e.code, e.message.as_deref()) {
                (Some(code), Some(msg)) => format!("{msg} (code {code})"),
                (None, Some(msg)) => msg.to_string(),
                (Some(code), None) => format!("code {code}"),
                (None, None) => "unknown error".to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// Seconds until `x-rate-limit-reset`, when the header is present and in the future.
fn reset_hint(headers: &header::HeaderMap) -> Option<u64> {
    let reset: u64 = headers
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())?;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs();
    reset.checked_sub(now)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use wiremock::{
        matchers::{header_exists, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    pub(crate) fn test_credentials() -> Credentials {
        Credentials {
            consumer_key: "test_consumer_key".into(),
            consumer_secret: "test_consumer_secret".into(),
            access_token: "test_access_token".into(),
            access_token_secret: "test_access_token_secret".into(),
        }
    }

    pub(crate) fn test_api(mock_server: &MockServer, page_size: usize) -> ApiConfig {
        ApiConfig {
            api_url: mock_server.uri(),
            stream_url: mock_server.uri(),
            timeout_secs: 5,
            page_size,
        }
    }

    pub(crate) async fn mount_verify(mock_server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(VERIFY_CREDENTIALS))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id_str": "42",
                "screen_name": "nebula0087"
            })))
            .mount(mock_server)
            .await;
    }

    /// A verified handle against `mock_server`.
    pub(crate) async fn test_handle(
        mock_server: &MockServer,
        page_size: usize,
        target_user: Option<&str>,
    ) -> ClientHandle {
        mount_verify(mock_server).await;
        authenticate(
            &test_api(mock_server, page_size),
            &test_credentials(),
            target_user.map(str::to_string),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let mock_server = MockServer::start().await;
        let handle = test_handle(&mock_server, 200, Some("SamHarrisOrg")).await;

        assert_eq!(handle.account().screen_name, "nebula0087");
        assert_eq!(handle.account().id_str, "42");
        assert_eq!(handle.target_user(), Some("SamHarrisOrg"));
        assert_eq!(handle.page_size(), 200);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_empty_credentials_without_request() {
        let mock_server = MockServer::start().await;
        let credentials = Credentials {
            consumer_secret: String::new(),
            ..test_credentials()
        };

        let err = authenticate(&test_api(&mock_server, 200), &credentials, None)
            .await
            .unwrap_err();

        assert!(matches!(err, TweetError::Auth(ref m) if m.contains("consumer_secret")));
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authenticate_rejected_by_remote() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERIFY_CREDENTIALS))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "errors": [{"code": 32, "message": "Could not authenticate you."}]
            })))
            .mount(&mock_server)
            .await;

        let err = authenticate(&test_api(&mock_server, 200), &test_credentials(), None)
            .await
            .unwrap_err();

        match err {
            TweetError::Auth(message) => {
                assert_eq!(message, "Could not authenticate you. (code 32)")
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERIFY_CREDENTIALS))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("x-rate-limit-reset", "1700000000")
                    .set_body_json(serde_json::json!({
                        "errors": [{"code": 88, "message": "Rate limit exceeded"}]
                    })),
            )
            .mount(&mock_server)
            .await;

        let err = authenticate(&test_api(&mock_server, 200), &test_credentials(), None)
            .await
            .unwrap_err();

        // the reset time is in the past, so no hint survives
        assert!(matches!(err, TweetError::RateLimited { retry_after: None }));
    }

    #[tokio::test]
    async fn test_other_status_is_api_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERIFY_CREDENTIALS))
            .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
            .mount(&mock_server)
            .await;

        let err = authenticate(&test_api(&mock_server, 200), &test_credentials(), None)
            .await
            .unwrap_err();

        match err {
            TweetError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "over capacity");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_user_timeline_requires_target() {
        let mock_server = MockServer::start().await;
        let handle = test_handle(&mock_server, 200, None).await;

        let err = handle.user_timeline(5).await.unwrap_err();
        assert!(matches!(err, TweetError::Config(_)));
    }

    #[test]
    fn test_reset_hint_in_future() {
        let future = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 120;
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "x-rate-limit-reset",
            header::HeaderValue::from_str(&future.to_string()).unwrap(),
        );

        let hint = reset_hint(&headers).unwrap();
        assert!(hint > 100 && hint <= 120);
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        assert_eq!(error_message(b"  plain text  "), "plain text");
        assert_eq!(
            error_message(br#"{"errors":[{"message":"a"},{"code":7}]}"#),
            "a; code 7"
        );
    }
}
