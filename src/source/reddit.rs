//! Ranked-submission feed source backed by the Reddit OAuth API.
//!
//! - Authentication: password grant against `{auth}/api/v1/access_token`
//!   with the app's client id/secret as HTTP basic credentials.
//! - Listing: `{api}/r/{subreddit}/top?t=all`, paged by the `after` token.
//! - Retirement: moderator remove via `{api}/api/remove`.
//! - Content: plain unauthenticated GET against whatever host the
//!   submission links to.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::item::{
    CREATED_AT_SENTINEL, CommentFields, MISSING_AUTHOR, MISSING_ID, RemoteItem, missing_field,
};
use crate::sync::{LISTING_KEY, RateLimiter};

use super::{
    AuthError, Authenticator, FetchedContent, HttpTimeouts, RawPage, RemoteSource,
    SourceDescriptor, SourceError, build_http_client, default_user_agent, fetch_content,
    status_error,
};

/// Registry descriptor for this source.
pub const REDDIT_DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "reddit",
    display_name: "Reddit",
};

/// Default OAuth token host.
pub const DEFAULT_AUTH_BASE_URL: &str = "https://www.reddit.com";

/// Default authenticated API host.
pub const DEFAULT_API_BASE_URL: &str = "https://oauth.reddit.com";

/// Default cap on submissions mirrored per run (the listing API stops near 1000).
pub const DEFAULT_SUBMISSIONS_LIMIT: usize = 1000;

/// Media oembed fields copied into [`RemoteItem::media`].
const OEMBED_FIELDS: [&str; 8] = [
    "author_name",
    "author_url",
    "height",
    "html",
    "provider_name",
    "provider_url",
    "title",
    "width",
];

/// Script-app credentials.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    /// Overrides the default user-agent; Reddit asks for a descriptive one.
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Target and endpoint settings for one Reddit mirror.
#[derive(Debug, Clone)]
pub struct RedditSettings {
    pub subreddit: String,
    pub submissions_limit: usize,
    pub fetch_comments: bool,
    pub auth_base_url: String,
    pub api_base_url: String,
    pub timeouts: HttpTimeouts,
}

impl RedditSettings {
    /// Settings for `subreddit` against the public Reddit hosts.
    #[must_use]
    pub fn new(subreddit: impl Into<String>) -> Self {
        Self {
            subreddit: subreddit.into(),
            submissions_limit: DEFAULT_SUBMISSIONS_LIMIT,
            fetch_comments: false,
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeouts: HttpTimeouts::default(),
        }
    }
}

/// Opens a [`RedditSource`] via the OAuth password grant.
#[derive(Debug, Clone)]
pub struct RedditAuthenticator {
    credentials: RedditCredentials,
    settings: RedditSettings,
}

impl RedditAuthenticator {
    #[must_use]
    pub fn new(credentials: RedditCredentials, settings: RedditSettings) -> Self {
        Self {
            credentials,
            settings,
        }
    }

    fn check_credentials(&self) -> Result<(), AuthError> {
        let required = [
            ("client_id", &self.credentials.client_id),
            ("client_secret", &self.credentials.client_secret),
            ("username", &self.credentials.username),
            ("password", &self.credentials.password),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(AuthError::missing_credential(REDDIT_DESCRIPTOR.name, key));
            }
        }
        if self.settings.subreddit.trim().is_empty() {
            return Err(AuthError::missing_credential(
                REDDIT_DESCRIPTOR.name,
                "subreddit",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl Authenticator for RedditAuthenticator {
    fn descriptor(&self) -> SourceDescriptor {
        REDDIT_DESCRIPTOR
    }

    #[instrument(skip(self, limiter), fields(source = REDDIT_DESCRIPTOR.name, subreddit = %self.settings.subreddit))]
    async fn authenticate(
        &self,
        limiter: Arc<RateLimiter>,
    ) -> Result<Box<dyn RemoteSource>, AuthError> {
        self.check_credentials()?;

        let user_agent = self
            .credentials
            .user_agent
            .clone()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(default_user_agent);
        let to_request_error = |error: reqwest::Error| {
            AuthError::request(
                REDDIT_DESCRIPTOR.name,
                SourceError::invalid_response("http client", error.to_string()),
            )
        };
        let api = build_http_client(&user_agent, self.settings.timeouts).map_err(to_request_error)?;
        let content = build_http_client(&default_user_agent(), self.settings.timeouts)
            .map_err(to_request_error)?;

        let token_url = format!(
            "{}/api/v1/access_token",
            self.settings.auth_base_url.trim_end_matches('/')
        );
        let response = api
            .post(&token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                AuthError::request(REDDIT_DESCRIPTOR.name, SourceError::from_reqwest(&token_url, e))
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(AuthError::rejected(
                REDDIT_DESCRIPTOR.name,
                format!("HTTP {status} from token endpoint"),
            ));
        }
        if !response.status().is_success() {
            return Err(AuthError::request(
                REDDIT_DESCRIPTOR.name,
                status_error(&token_url, &response),
            ));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AuthError::request(
                REDDIT_DESCRIPTOR.name,
                SourceError::invalid_response(&token_url, e.to_string()),
            )
        })?;

        // The token endpoint reports bad credentials with a 200 and an error field.
        if let Some(error) = token.error {
            return Err(AuthError::rejected(REDDIT_DESCRIPTOR.name, error));
        }
        let Some(access_token) = token.access_token.filter(|t| !t.is_empty()) else {
            return Err(AuthError::rejected(
                REDDIT_DESCRIPTOR.name,
                "token response carried no access_token",
            ));
        };

        info!("authenticated");
        Ok(Box::new(RedditSource {
            api,
            content,
            access_token,
            settings: self.settings.clone(),
            limiter,
            remaining: AtomicUsize::new(self.settings.submissions_limit),
        }))
    }
}

/// Authenticated Reddit handle.
pub struct RedditSource {
    api: Client,
    content: Client,
    access_token: String,
    settings: RedditSettings,
    /// Paces per-submission comment requests on the listing slot.
    limiter: Arc<RateLimiter>,
    /// Submissions still allowed under `submissions_limit` for this handle.
    remaining: AtomicUsize,
}

impl std::fmt::Debug for RedditSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditSource")
            .field("access_token", &"<redacted>")
            .field("settings", &self.settings)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl RedditSource {
    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.settings.api_base_url.trim_end_matches('/'))
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        let response = self
            .api
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(url, e))?;

        if !response.status().is_success() {
            return Err(status_error(url, &response));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::invalid_response(url, e.to_string()))
    }

    /// Fetches top-level comments for one submission.
    #[instrument(skip(self))]
    async fn fetch_comments(&self, id: &str) -> Result<BTreeMap<String, CommentFields>, SourceError> {
        let url = self.api_url(&format!("/comments/{id}"));
        let body = self
            .get_json(&url, &[("raw_json", "1".to_string()), ("depth", "1".to_string())])
            .await?;

        // Response is [submission listing, comment listing].
        let comment_listing = body
            .as_array()
            .and_then(|parts| parts.get(1))
            .ok_or_else(|| SourceError::invalid_response(&url, "missing comment listing"))?;
        Ok(parse_comment_listing(comment_listing))
    }
}

#[async_trait]
impl RemoteSource for RedditSource {
    fn descriptor(&self) -> SourceDescriptor {
        REDDIT_DESCRIPTOR
    }

    #[instrument(skip(self), fields(subreddit = %self.settings.subreddit))]
    async fn list_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<RawPage, SourceError> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        if remaining == 0 {
            debug!("submissions limit reached, ending listing");
            return Ok(RawPage::default());
        }
        let limit = remaining.min(page_size as usize);

        let url = self.api_url(&format!("/r/{}/top", self.settings.subreddit));
        let mut query = vec![
            ("t", "all".to_string()),
            ("limit", limit.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(after) = cursor {
            query.push(("after", after.to_string()));
        }

        let body = self.get_json(&url, &query).await?;
        let (mut items, continuation) = parse_listing(&body)
            .ok_or_else(|| SourceError::invalid_response(&url, "not a listing"))?;
        items.truncate(limit);
        self.remaining
            .store(remaining.saturating_sub(items.len()), Ordering::SeqCst);

        if self.settings.fetch_comments {
            for item in &mut items {
                if item.id == MISSING_ID {
                    continue;
                }
                self.limiter.acquire(LISTING_KEY).await;
                match self.fetch_comments(&item.id).await {
                    Ok(comments) => item.comments = comments,
                    Err(error) => warn!(
                        item_id = %item.id,
                        error = %error,
                        "comment fetch failed, keeping empty comment mapping"
                    ),
                }
            }
        }

        debug!(items = items.len(), has_more = continuation.is_some(), "listing page parsed");
        Ok(RawPage {
            items,
            continuation,
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<FetchedContent, SourceError> {
        fetch_content(&self.content, url).await
    }

    #[instrument(skip(self))]
    async fn delete_remote(&self, id: &str) -> Result<(), SourceError> {
        let url = self.api_url("/api/remove");
        let fullname = format!("t3_{id}");
        let response = self
            .api
            .post(&url)
            .bearer_auth(&self.access_token)
            .form(&[("id", fullname.as_str()), ("spam", "false")])
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;

        if !response.status().is_success() {
            return Err(status_error(&url, &response));
        }
        Ok(())
    }
}

/// Parses a listing body into items and the `after` continuation token.
///
/// Returns `None` when the body is not shaped like a listing at all.
fn parse_listing(body: &Value) -> Option<(Vec<RemoteItem>, Option<String>)> {
    let data = body.get("data")?.as_object()?;
    let continuation = data
        .get("after")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string);
    let items = data
        .get("children")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| child.get("data"))
                .map(parse_submission)
                .collect()
        })
        .unwrap_or_default();
    Some((items, continuation))
}

/// Converts one submission record, applying the missing-field sentinels.
fn parse_submission(data: &Value) -> RemoteItem {
    let id = data
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .unwrap_or(MISSING_ID);
    let author = data
        .get("author")
        .and_then(Value::as_str)
        .filter(|author| !author.is_empty())
        .unwrap_or(MISSING_AUTHOR);
    let created_at = data
        .get("created_utc")
        .and_then(Value::as_f64)
        .unwrap_or(CREATED_AT_SENTINEL);
    let url = data
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(ToString::to_string);

    let mut item = RemoteItem::new(id, url, author, created_at);
    item.media = parse_media(data.get("media"));
    item
}

fn parse_media(media: Option<&Value>) -> BTreeMap<String, Value> {
    let error = |reason: &str| BTreeMap::from([("error".to_string(), Value::from(reason))]);

    let Some(media) = media.and_then(Value::as_object) else {
        return error("no_media");
    };
    let Some(oembed) = media.get("oembed").and_then(Value::as_object) else {
        return error("no_media_oembed");
    };

    OEMBED_FIELDS
        .iter()
        .map(|field| {
            let value = oembed
                .get(*field)
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| Value::from(missing_field("media", field)));
            ((*field).to_string(), value)
        })
        .collect()
}

fn parse_comment_listing(listing: &Value) -> BTreeMap<String, CommentFields> {
    let Some(children) = listing
        .get("data")
        .and_then(|data| data.get("children"))
        .and_then(Value::as_array)
    else {
        return BTreeMap::new();
    };

    children
        .iter()
        .filter(|child| child.get("kind").and_then(Value::as_str) == Some("t1"))
        .filter_map(|child| child.get("data").and_then(Value::as_object))
        .filter_map(|data| {
            let id = data.get("id").and_then(Value::as_str)?.to_string();
            Some((id, parse_comment(data)))
        })
        .collect()
}

fn parse_comment(data: &Map<String, Value>) -> CommentFields {
    let field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .map_or_else(|| missing_field("comment", key), ToString::to_string)
    };
    CommentFields {
        body: field("body"),
        link_id: field("link_id"),
        name: field("name"),
        parent_id: field("parent_id"),
        permalink: field("permalink"),
    }
}
