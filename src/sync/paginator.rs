//! Cursor-based pagination over a remote listing.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::item::RemoteItem;
use crate::source::{RemoteSource, SourceError};

use super::rate_limiter::{LISTING_KEY, RateLimiter};

/// Position in a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Before the first page.
    Initial,
    /// Continuation token returned by the previous page.
    Token(String),
    /// The listing is exhausted.
    NoMorePages,
}

impl Cursor {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NoMorePages)
    }

    /// Token to send with the next request, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Token(token) => Some(token),
            Self::Initial | Self::NoMorePages => None,
        }
    }
}

/// Pagination failures.
#[derive(Debug, Error)]
pub enum PaginationError {
    /// The page request failed; `cursor` is unchanged and may be retried.
    #[error("page fetch failed at cursor {cursor:?}: {source}")]
    Transient {
        /// Last-known-good cursor.
        cursor: Cursor,
        #[source]
        source: SourceError,
    },

    /// The configured page bound was reached before the listing ended.
    #[error("page limit of {max_pages} reached before the listing ended")]
    PageLimitExceeded { max_pages: usize },

    /// The remote returned the token it was just given.
    #[error("remote returned continuation token {token:?} twice in a row")]
    RepeatedCursor { token: String },
}

/// Walks a listing page by page.
///
/// Each successful [`next_page`](Self::next_page) advances the cursor; a
/// failed one leaves it untouched. Restarting means building a new paginator.
pub struct Paginator {
    source: Arc<dyn RemoteSource>,
    limiter: Arc<RateLimiter>,
    page_size: u32,
    max_pages: usize,
    cursor: Cursor,
    pages_fetched: usize,
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("source", &self.source.descriptor().name)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("cursor", &self.cursor)
            .field("pages_fetched", &self.pages_fetched)
            .finish_non_exhaustive()
    }
}

impl Paginator {
    #[must_use]
    pub fn new(
        source: Arc<dyn RemoteSource>,
        limiter: Arc<RateLimiter>,
        page_size: u32,
        max_pages: usize,
    ) -> Self {
        Self {
            source,
            limiter,
            page_size,
            max_pages,
            cursor: Cursor::Initial,
            pages_fetched: 0,
        }
    }

    #[must_use]
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cursor.is_terminal()
    }

    /// Fetches the next page.
    ///
    /// Returns `Ok(None)` without any network call once the cursor is terminal.
    /// An empty page with a continuation token is returned as `Some(vec![])`.
    ///
    /// # Errors
    ///
    /// - [`PaginationError::Transient`] when the request fails (cursor unchanged)
    /// - [`PaginationError::PageLimitExceeded`] when `max_pages` were already fetched
    /// - [`PaginationError::RepeatedCursor`] when the remote echoes the current token
    #[instrument(skip(self), fields(source = self.source.descriptor().name, page = self.pages_fetched + 1))]
    pub async fn next_page(&mut self) -> Result<Option<Vec<RemoteItem>>, PaginationError> {
        if self.cursor.is_terminal() {
            return Ok(None);
        }
        if self.pages_fetched >= self.max_pages {
            return Err(PaginationError::PageLimitExceeded {
                max_pages: self.max_pages,
            });
        }

        self.limiter.acquire(LISTING_KEY).await;
        let page = self
            .source
            .list_page(self.cursor.token(), self.page_size)
            .await
            .map_err(|source| PaginationError::Transient {
                cursor: self.cursor.clone(),
                source,
            })?;
        self.pages_fetched += 1;

        let next = match page.continuation {
            None => Cursor::NoMorePages,
            Some(token) if self.cursor.token() == Some(token.as_str()) => {
                self.cursor = Cursor::NoMorePages;
                return Err(PaginationError::RepeatedCursor { token });
            }
            Some(token) => Cursor::Token(token),
        };

        debug!(
            items = page.items.len(),
            next = ?next,
            "page fetched"
        );
        self.cursor = next;
        Ok(Some(page.items))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::source::{FetchedContent, RawPage, SourceDescriptor};

    const FAKE: SourceDescriptor = SourceDescriptor {
        name: "fake",
        display_name: "Fake",
    };

    /// Serves scripted pages and records the cursors it was asked for.
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<RawPage, SourceError>>>,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<RawPage, SourceError>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RemoteSource for ScriptedSource {
        fn descriptor(&self) -> SourceDescriptor {
            FAKE
        }

        async fn list_page(
            &self,
            cursor: Option<&str>,
            _page_size: u32,
        ) -> Result<RawPage, SourceError> {
            self.seen.lock().unwrap().push(cursor.map(ToString::to_string));
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RawPage::default()))
        }

        async fn fetch_bytes(&self, url: &str) -> Result<FetchedContent, SourceError> {
            Err(SourceError::timeout(url))
        }

        async fn delete_remote(&self, _id: &str) -> Result<(), SourceError> {
            Ok(())
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> Result<RawPage, SourceError> {
        Ok(RawPage {
            items: ids
                .iter()
                .map(|id| RemoteItem::new(*id, None, "author", 1.0))
                .collect(),
            continuation: next.map(ToString::to_string),
        })
    }

    fn paginator(source: Arc<ScriptedSource>, max_pages: usize) -> Paginator {
        Paginator::new(source, Arc::new(RateLimiter::disabled()), 100, max_pages)
    }

    #[tokio::test]
    async fn test_paginates_until_no_continuation() {
        let source = ScriptedSource::new(vec![
            page(&["a", "b"], Some("t1")),
            page(&[], Some("t2")),
            page(&["c"], None),
        ]);
        let mut pager = paginator(Arc::clone(&source), 10);

        let mut ids = Vec::new();
        while let Some(items) = pager.next_page().await.unwrap() {
            ids.extend(items.into_iter().map(|i| i.id));
        }

        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(pager.pages_fetched(), 3);
        assert!(pager.is_done());
        assert_eq!(
            *source.seen.lock().unwrap(),
            [None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_terminal_cursor_makes_no_calls() {
        let source = ScriptedSource::new(vec![page(&["a"], None)]);
        let mut pager = paginator(Arc::clone(&source), 10);
        pager.next_page().await.unwrap();
        assert!(pager.next_page().await.unwrap().is_none());
        assert!(pager.next_page().await.unwrap().is_none());
        assert_eq!(source.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_cursor() {
        let source = ScriptedSource::new(vec![
            page(&["a"], Some("t1")),
            Err(SourceError::http_status("https://api/top", 503)),
            page(&["b"], None),
        ]);
        let mut pager = paginator(Arc::clone(&source), 10);
        pager.next_page().await.unwrap();

        let err = pager.next_page().await.unwrap_err();
        let PaginationError::Transient { cursor, .. } = err else {
            panic!("expected transient, got {err:?}");
        };
        assert_eq!(cursor, Cursor::Token("t1".to_string()));
        assert_eq!(pager.cursor(), &Cursor::Token("t1".to_string()));

        let items = pager.next_page().await.unwrap().unwrap();
        assert_eq!(items[0].id, "b");
        assert_eq!(source.seen.lock().unwrap()[2].as_deref(), Some("t1"));
        assert_eq!(pager.pages_fetched(), 2);
    }

    #[tokio::test]
    async fn test_page_limit_bounds_endless_listing() {
        let pages = (0..10)
            .map(|n| page(&["x"], Some(&format!("t{n}"))))
            .collect();
        let source = ScriptedSource::new(pages);
        let mut pager = paginator(source, 3);
        for _ in 0..3 {
            assert!(pager.next_page().await.unwrap().is_some());
        }
        assert!(matches!(
            pager.next_page().await,
            Err(PaginationError::PageLimitExceeded { max_pages: 3 })
        ));
    }

    #[tokio::test]
    async fn test_repeated_token_stops_pagination() {
        let source = ScriptedSource::new(vec![
            page(&["a"], Some("same")),
            page(&["a"], Some("same")),
        ]);
        let mut pager = paginator(source, 10);
        pager.next_page().await.unwrap();
        assert!(matches!(
            pager.next_page().await,
            Err(PaginationError::RepeatedCursor { .. })
        ));
        assert!(pager.is_done());
        assert_eq!(pager.pages_fetched(), 2);
    }
}
