//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cloner_core::item::RemoteItem;
use cloner_core::source::{FetchedContent, RawPage};
use cloner_core::{
    AuthError, Authenticator, RateLimiter, RemoteSource, SourceDescriptor, SourceError,
};

pub const FAKE_SOURCE: SourceDescriptor = SourceDescriptor {
    name: "fake",
    display_name: "Fake Feed",
};

/// Scripted remote shared between the authenticator and the handles it opens.
#[derive(Default)]
pub struct FakeRemote {
    /// Pages keyed by the cursor that requests them (`None` = first page).
    pages: Mutex<HashMap<Option<String>, Vec<Result<RawPage, SourceError>>>>,
    content: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    reject_deletes: Mutex<HashSet<String>>,
    pub list_calls: Mutex<Vec<Option<String>>>,
    pub fetch_calls: Mutex<Vec<String>>,
    pub delete_calls: Mutex<Vec<String>>,
    pub reject_auth: bool,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting_auth() -> Arc<Self> {
        Arc::new(Self {
            reject_auth: true,
            ..Self::default()
        })
    }

    /// Serves `items` for `cursor`, pointing at `next`.
    pub fn page(&self, cursor: Option<&str>, items: Vec<RemoteItem>, next: Option<&str>) {
        self.push_response(
            cursor,
            Ok(RawPage {
                items,
                continuation: next.map(ToString::to_string),
            }),
        );
    }

    /// Queues one failing response for `cursor`, served before any page.
    pub fn page_error(&self, cursor: Option<&str>, error: SourceError) {
        self.push_response(cursor, Err(error));
    }

    fn push_response(&self, cursor: Option<&str>, response: Result<RawPage, SourceError>) {
        let mut pages = self.pages.lock().unwrap();
        let queue = pages.entry(cursor.map(ToString::to_string)).or_default();
        if response.is_err() {
            queue.insert(0, response);
        } else {
            queue.push(response);
        }
    }

    pub fn content(&self, url: &str, status: u16, body: &[u8]) {
        self.content
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_vec()));
    }

    pub fn reject_delete(&self, id: &str) {
        self.reject_deletes.lock().unwrap().insert(id.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.delete_calls.lock().unwrap().clone()
    }
}

/// Handle over a [`FakeRemote`].
pub struct FakeSource(pub Arc<FakeRemote>);

#[async_trait]
impl RemoteSource for FakeSource {
    fn descriptor(&self) -> SourceDescriptor {
        FAKE_SOURCE
    }

    async fn list_page(
        &self,
        cursor: Option<&str>,
        _page_size: u32,
    ) -> Result<RawPage, SourceError> {
        let key = cursor.map(ToString::to_string);
        self.0.list_calls.lock().unwrap().push(key.clone());
        let mut pages = self.0.pages.lock().unwrap();
        let Some(queue) = pages.get_mut(&key).filter(|q| !q.is_empty()) else {
            return Ok(RawPage::default());
        };
        // The last scripted page for a cursor is sticky so re-runs see it again.
        if queue.len() == 1 {
            if let Ok(page) = &queue[0] {
                return Ok(page.clone());
            }
        }
        queue.remove(0)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<FetchedContent, SourceError> {
        self.0.fetch_calls.lock().unwrap().push(url.to_string());
        let (status, bytes) = self
            .0
            .content
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SourceError::timeout(url))?;
        Ok(FetchedContent {
            status,
            final_url: url.to_string(),
            bytes,
        })
    }

    async fn delete_remote(&self, id: &str) -> Result<(), SourceError> {
        self.0.delete_calls.lock().unwrap().push(id.to_string());
        if self.0.reject_deletes.lock().unwrap().contains(id) {
            return Err(SourceError::http_status("https://fake/api/remove", 500));
        }
        Ok(())
    }
}

/// Authenticator opening [`FakeSource`] handles.
pub struct FakeAuthenticator(pub Arc<FakeRemote>);

#[async_trait]
impl Authenticator for FakeAuthenticator {
    fn descriptor(&self) -> SourceDescriptor {
        FAKE_SOURCE
    }

    async fn authenticate(
        &self,
        _limiter: Arc<RateLimiter>,
    ) -> Result<Box<dyn RemoteSource>, AuthError> {
        if self.0.reject_auth {
            return Err(AuthError::rejected(FAKE_SOURCE.name, "invalid_grant"));
        }
        Ok(Box::new(FakeSource(Arc::clone(&self.0))))
    }
}

pub fn item(id: &str, url: &str, created_at: f64) -> RemoteItem {
    RemoteItem::new(id, Some(url.to_string()), "poster", created_at)
}
