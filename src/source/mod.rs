//! Remote source collaborators: authentication, listing, content fetch, delete.
//!
//! The sync core only talks to a remote through two narrow traits:
//!
//! - [`Authenticator`] - turns configured credentials into a live handle;
//!   failure here is fatal for the run.
//! - [`RemoteSource`] - the authenticated handle: list one page, fetch bytes,
//!   delete one item.
//!
//! Concrete sources are wired up through the explicit
//! [`SourceRegistry`](registry::SourceRegistry) table rather than discovered
//! at runtime.

pub mod drive;
mod error;
mod http_client;
pub mod reddit;
pub mod registry;

pub use error::{AuthError, SourceError};
pub use http_client::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpTimeouts, build_http_client,
    default_user_agent,
};
pub use drive::{DriveAuthenticator, DriveSettings, DriveSource};
pub use reddit::{RedditAuthenticator, RedditCredentials, RedditSettings, RedditSource};
pub use registry::{RegistryError, SourceEntry, SourceRegistry, build_default_source_registry};

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tracing::{debug, instrument};

use crate::item::RemoteItem;
use crate::sync::RateLimiter;

/// Immutable description of a source, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Stable source name used in config and as the destination folder name.
    pub name: &'static str,
    /// Human-readable label for logs and summaries.
    pub display_name: &'static str,
}

/// One page of results as returned by the remote listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Records on this page, in remote order. May be empty.
    pub items: Vec<RemoteItem>,
    /// Continuation token; `None` means the listing is exhausted.
    pub continuation: Option<String>,
}

/// Bytes fetched from a content URL.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// HTTP status of the final response.
    pub status: u16,
    /// URL of the final response, after redirects.
    pub final_url: String,
    pub bytes: Vec<u8>,
}

impl FetchedContent {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Produces an authenticated [`RemoteSource`] handle.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns the descriptor of the source this authenticator opens.
    fn descriptor(&self) -> SourceDescriptor;

    /// Authenticates against the remote. The returned handle paces any
    /// enrichment requests it makes inside one call through `limiter`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on missing, rejected, or expired credentials.
    async fn authenticate(
        &self,
        limiter: Arc<RateLimiter>,
    ) -> Result<Box<dyn RemoteSource>, AuthError>;
}

/// An authenticated handle to a remote listing.
///
/// Implementations make exactly one outbound request per call, plus any
/// per-record enrichment a page needs. Pacing between calls is the caller's
/// job; enrichment requests go through the limiter handed to
/// [`Authenticator::authenticate`].
#[async_trait]
pub trait RemoteSource: Send + Sync {
    fn descriptor(&self) -> SourceDescriptor;

    /// Lists one page. `cursor` is `None` for the first page, otherwise the
    /// continuation token returned by the previous page.
    async fn list_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<RawPage, SourceError>;

    /// Fetches raw bytes from a content URL. Non-success statuses are
    /// returned, not raised.
    async fn fetch_bytes(&self, url: &str) -> Result<FetchedContent, SourceError>;

    /// Deletes (retires) the remote copy of one item.
    async fn delete_remote(&self, id: &str) -> Result<(), SourceError>;
}

/// Fetches `url` with a plain GET and returns status, final URL and body.
///
/// Shared by sources whose content lives on third-party hosts.
///
/// # Errors
///
/// Returns [`SourceError`] on network failure or timeout.
#[instrument(skip(client), fields(url = %url))]
pub async fn fetch_content(client: &Client, url: &str) -> Result<FetchedContent, SourceError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(url, e))?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| SourceError::from_reqwest(url, e))?
        .to_vec();

    debug!(status, final_url = %final_url, bytes = bytes.len(), "content fetched");
    Ok(FetchedContent {
        status,
        final_url,
        bytes,
    })
}

/// Builds a [`SourceError::HttpStatus`] from a non-success API response.
pub(crate) fn status_error(url: &str, response: &reqwest::Response) -> SourceError {
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    SourceError::http_status_with_retry_after(url, response.status().as_u16(), retry_after)
}
