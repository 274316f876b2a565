//! File-listing source backed by the Google Drive v3 API.
//!
//! - Authentication: a pre-issued OAuth bearer token (metadata read-only
//!   scope is enough), checked once against `{api}/about`.
//! - Listing: `{api}/files`, paged by `pageToken` / `nextPageToken`.
//! - Content and retirement are not offered: records carry no content URL,
//!   so the persist stage skips them, and remote deletes fail with
//!   [`SourceError::Unsupported`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::item::{CREATED_AT_SENTINEL, MISSING_AUTHOR, MISSING_ID, RemoteItem, missing_field};
use crate::sync::RateLimiter;

use super::{
    AuthError, Authenticator, FetchedContent, HttpTimeouts, RawPage, RemoteSource,
    SourceDescriptor, SourceError, build_http_client, default_user_agent, status_error,
};

/// Registry descriptor for this source.
pub const DRIVE_DESCRIPTOR: SourceDescriptor = SourceDescriptor {
    name: "drive",
    display_name: "Google Drive",
};

/// Default Drive API host.
pub const DEFAULT_DRIVE_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Default listing filter.
pub const DEFAULT_DRIVE_QUERY: &str = "trashed=false";

/// Partial-response field selector for `files.list`.
const LIST_FIELDS: &str = "nextPageToken,files(id,kind,name,mimeType,createdTime,owners(displayName))";

/// Endpoint and filter settings for one Drive listing.
#[derive(Debug, Clone)]
pub struct DriveSettings {
    pub api_base_url: String,
    /// Drive search expression passed as `q`. Empty lists everything visible.
    pub query: String,
    pub timeouts: HttpTimeouts,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_DRIVE_API_BASE_URL.to_string(),
            query: DEFAULT_DRIVE_QUERY.to_string(),
            timeouts: HttpTimeouts::default(),
        }
    }
}

/// Opens a [`DriveSource`] from a bearer token.
#[derive(Clone)]
pub struct DriveAuthenticator {
    access_token: String,
    settings: DriveSettings,
}

impl std::fmt::Debug for DriveAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveAuthenticator")
            .field("access_token", &"<redacted>")
            .field("settings", &self.settings)
            .finish()
    }
}

impl DriveAuthenticator {
    #[must_use]
    pub fn new(access_token: impl Into<String>, settings: DriveSettings) -> Self {
        Self {
            access_token: access_token.into(),
            settings,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.settings.api_base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Authenticator for DriveAuthenticator {
    fn descriptor(&self) -> SourceDescriptor {
        DRIVE_DESCRIPTOR
    }

    #[instrument(skip(self, _limiter), fields(source = DRIVE_DESCRIPTOR.name))]
    async fn authenticate(
        &self,
        _limiter: Arc<RateLimiter>,
    ) -> Result<Box<dyn RemoteSource>, AuthError> {
        if self.access_token.trim().is_empty() {
            return Err(AuthError::missing_credential(
                DRIVE_DESCRIPTOR.name,
                "access_token",
            ));
        }

        let api = build_http_client(&default_user_agent(), self.settings.timeouts).map_err(
            |error| {
                AuthError::request(
                    DRIVE_DESCRIPTOR.name,
                    SourceError::invalid_response("http client", error.to_string()),
                )
            },
        )?;

        let about_url = self.api_url("/about");
        let response = api
            .get(&about_url)
            .bearer_auth(&self.access_token)
            .query(&[("fields", "user(displayName)")])
            .send()
            .await
            .map_err(|e| {
                AuthError::request(DRIVE_DESCRIPTOR.name, SourceError::from_reqwest(&about_url, e))
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(AuthError::rejected(
                DRIVE_DESCRIPTOR.name,
                format!("HTTP {status} from about endpoint"),
            ));
        }
        if !response.status().is_success() {
            return Err(AuthError::request(
                DRIVE_DESCRIPTOR.name,
                status_error(&about_url, &response),
            ));
        }

        info!("authenticated");
        Ok(Box::new(DriveSource {
            api,
            access_token: self.access_token.clone(),
            settings: self.settings.clone(),
        }))
    }
}

/// Authenticated Drive handle.
pub struct DriveSource {
    api: Client,
    access_token: String,
    settings: DriveSettings,
}

impl std::fmt::Debug for DriveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveSource")
            .field("access_token", &"<redacted>")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilesListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: Option<String>,
    kind: Option<String>,
    name: Option<String>,
    mime_type: Option<String>,
    created_time: Option<String>,
    #[serde(default)]
    owners: Vec<DriveOwner>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveOwner {
    display_name: Option<String>,
}

#[async_trait]
impl RemoteSource for DriveSource {
    fn descriptor(&self) -> SourceDescriptor {
        DRIVE_DESCRIPTOR
    }

    #[instrument(skip(self))]
    async fn list_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<RawPage, SourceError> {
        let url = format!("{}/files", self.settings.api_base_url.trim_end_matches('/'));
        let mut query = vec![
            ("pageSize", page_size.to_string()),
            ("fields", LIST_FIELDS.to_string()),
        ];
        if !self.settings.query.is_empty() {
            query.push(("q", self.settings.query.clone()));
        }
        if let Some(token) = cursor {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .api
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;
        if !response.status().is_success() {
            return Err(status_error(&url, &response));
        }

        let body: FilesListResponse = response
            .json()
            .await
            .map_err(|e| SourceError::invalid_response(&url, e.to_string()))?;

        let items: Vec<RemoteItem> = body.files.into_iter().map(file_to_item).collect();
        let continuation = body.next_page_token.filter(|token| !token.is_empty());
        debug!(items = items.len(), has_more = continuation.is_some(), "file page parsed");
        Ok(RawPage {
            items,
            continuation,
        })
    }

    async fn fetch_bytes(&self, _url: &str) -> Result<FetchedContent, SourceError> {
        Err(SourceError::unsupported(DRIVE_DESCRIPTOR.name, "content fetch"))
    }

    async fn delete_remote(&self, _id: &str) -> Result<(), SourceError> {
        Err(SourceError::unsupported(DRIVE_DESCRIPTOR.name, "remote delete"))
    }
}

fn file_to_item(file: DriveFile) -> RemoteItem {
    let id = file
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| MISSING_ID.to_string());
    let author = file
        .owners
        .into_iter()
        .find_map(|owner| owner.display_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| MISSING_AUTHOR.to_string());
    let created_at = file
        .created_time
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(CREATED_AT_SENTINEL);

    let mut item = RemoteItem::new(id, None, author, created_at);
    item.media = BTreeMap::from([
        ("kind".to_string(), descriptive("kind", file.kind)),
        ("mime_type".to_string(), descriptive("mime_type", file.mime_type)),
        ("name".to_string(), descriptive("name", file.name)),
    ]);
    item
}

fn descriptive(field: &str, value: Option<String>) -> Value {
    Value::from(value.unwrap_or_else(|| missing_field("file", field)))
}

/// Parses an RFC 3339 timestamp into epoch seconds.
#[allow(clippy::cast_precision_loss)]
fn parse_timestamp(rfc3339: &str) -> Option<f64> {
    DateTime::parse_from_rfc3339(rfc3339)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp() as f64)
}
