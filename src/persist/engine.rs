//! Fetch, classify, write and confirm one item at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::classify::{Classification, Classifier, UrlExtension, extension_of};
use crate::item::RemoteItem;
use crate::source::{FetchedContent, RemoteSource};
use crate::sync::{RateLimiter, content_key};

use super::confirm::confirm_written;
use super::layout::{ArtifactPaths, artifact_paths, sanitize_component, source_dir};
use super::sidecar::{write_sidecar, write_synced};
use super::PersistError;

/// Why an item was not persisted. Skips are expected outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    /// The record carries no content URL.
    NoUrl,
    /// `id`, `author` or `created_at` holds a sentinel.
    MissingRequiredField,
    /// The id is not usable as a directory name as-is.
    InvalidId,
    /// The content request failed at the network level.
    FetchFailed,
    /// The content request returned a non-success status.
    BadStatus,
    /// A wrapper page had no usable link.
    ResolutionFailed,
    /// No classification branch matched.
    Unclassified,
    /// Known host skipped on purpose.
    IgnoredByPolicy,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoUrl => "no-url",
            Self::MissingRequiredField => "missing-required-field",
            Self::InvalidId => "invalid-id",
            Self::FetchFailed => "fetch-failed",
            Self::BadStatus => "bad-status",
            Self::ResolutionFailed => "resolution-failed",
            Self::Unclassified => "unclassified",
            Self::IgnoredByPolicy => "ignored-by-policy",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof that an item's data file and sidecar were found on disk after writing.
///
/// Only [`FetchPersistEngine`] can construct one, and only after a confirming
/// directory scan. It is the sole way an id can enter a
/// [`RetirementSet`](crate::retire::RetirementSet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifact {
    id: String,
    data_path: PathBuf,
    sidecar_path: PathBuf,
}

impl PersistedArtifact {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    #[must_use]
    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar_path
    }

    #[cfg(test)]
    pub(crate) fn confirmed_for_test(id: &str) -> Self {
        Self {
            id: id.to_string(),
            data_path: PathBuf::from(format!("/confirmed/{id}/data")),
            sidecar_path: PathBuf::from(format!("/confirmed/{id}/data_metadata.json")),
        }
    }
}

/// Result of persisting one item.
#[derive(Debug)]
pub enum PersistOutcome {
    Persisted(PersistedArtifact),
    Skipped(SkipReason),
    Failed(PersistError),
}

/// Per-source fetch-persist engine.
pub struct FetchPersistEngine {
    source: Arc<dyn RemoteSource>,
    limiter: Arc<RateLimiter>,
    classifier: Classifier,
    source_dir: PathBuf,
}

impl std::fmt::Debug for FetchPersistEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPersistEngine")
            .field("source", &self.source.descriptor().name)
            .field("source_dir", &self.source_dir)
            .finish_non_exhaustive()
    }
}

impl FetchPersistEngine {
    /// Creates an engine writing under `<root>/<source-name>`.
    #[must_use]
    pub fn new(
        source: Arc<dyn RemoteSource>,
        limiter: Arc<RateLimiter>,
        classifier: Classifier,
        root: &Path,
    ) -> Self {
        let source_dir = source_dir(root, source.descriptor().name);
        Self {
            source,
            limiter,
            classifier,
            source_dir,
        }
    }

    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Persists one item. Never fails as a whole: every problem maps to a
    /// skip or failure outcome, logged with the item id and URL.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn persist(&self, item: &RemoteItem) -> PersistOutcome {
        if let Some(field) = item.missing_required_field() {
            info!(url = ?item.url, field, reason = %SkipReason::MissingRequiredField, "item skipped");
            return PersistOutcome::Skipped(SkipReason::MissingRequiredField);
        }
        // Two ids sanitizing to the same directory would confirm each other's files.
        let directory = sanitize_component(&item.id);
        if directory != item.id {
            info!(url = ?item.url, directory = %directory, reason = %SkipReason::InvalidId, "item skipped");
            return PersistOutcome::Skipped(SkipReason::InvalidId);
        }
        let Some(url) = item.url.as_deref() else {
            info!(reason = %SkipReason::NoUrl, "item skipped");
            return PersistOutcome::Skipped(SkipReason::NoUrl);
        };

        let content = match self.fetch(url).await {
            Ok(content) => content,
            Err(reason) => return PersistOutcome::Skipped(reason),
        };

        let (bytes, extension) = match self
            .classifier
            .classify(&content.final_url, &content.bytes)
        {
            Classification::Direct { extension } => (content.bytes, extension),
            Classification::Wrapped { kind, resolved_url } => {
                debug!(kind = kind.as_str(), resolved_url = %resolved_url, "fetching wrapped asset");
                let resolved = match self.fetch(&resolved_url).await {
                    Ok(resolved) => resolved,
                    Err(reason) => return PersistOutcome::Skipped(reason),
                };
                if let UrlExtension::Known(actual) = extension_of(&resolved.final_url) {
                    if actual != kind.target_extension() {
                        debug!(
                            kind = kind.as_str(),
                            final_url = %resolved.final_url,
                            actual = %actual,
                            expected = kind.target_extension(),
                            "resolved asset extension differs from wrapper target"
                        );
                    }
                }
                (resolved.bytes, kind.target_extension().to_string())
            }
            Classification::ResolutionFailed { kind } => {
                info!(url, kind = kind.as_str(), reason = %SkipReason::ResolutionFailed, "item skipped");
                return PersistOutcome::Skipped(SkipReason::ResolutionFailed);
            }
            Classification::IgnoredByPolicy { host } => {
                info!(url, host = %host, reason = %SkipReason::IgnoredByPolicy, "item skipped");
                return PersistOutcome::Skipped(SkipReason::IgnoredByPolicy);
            }
            Classification::Unclassified { extension } => {
                let extension = match &extension {
                    UrlExtension::Known(ext) => ext.as_str(),
                    UrlExtension::Missing => "<none>",
                };
                warn!(
                    url,
                    final_url = %content.final_url,
                    extension,
                    reason = %SkipReason::Unclassified,
                    "unclassified content shape"
                );
                return PersistOutcome::Skipped(SkipReason::Unclassified);
            }
        };

        let paths = artifact_paths(&self.source_dir, item, &extension);
        match write_and_confirm(&paths, item, &bytes).await {
            Ok(()) => {
                info!(path = %paths.data.display(), "item persisted");
                PersistOutcome::Persisted(PersistedArtifact {
                    id: item.id.clone(),
                    data_path: paths.data,
                    sidecar_path: paths.sidecar,
                })
            }
            Err(error) => {
                warn!(url, error = %error, category = error.category(), "item persistence failed");
                PersistOutcome::Failed(error)
            }
        }
    }

    /// Rate-limited content fetch mapping failures to skip reasons.
    async fn fetch(&self, url: &str) -> Result<FetchedContent, SkipReason> {
        self.limiter.acquire(&content_key(url)).await;
        match self.source.fetch_bytes(url).await {
            Ok(content) if content.is_success() => Ok(content),
            Ok(content) => {
                info!(url, status = content.status, reason = %SkipReason::BadStatus, "item skipped");
                Err(SkipReason::BadStatus)
            }
            Err(error) => {
                info!(url, error = %error, reason = %SkipReason::FetchFailed, "item skipped");
                Err(SkipReason::FetchFailed)
            }
        }
    }
}

async fn write_and_confirm(
    paths: &ArtifactPaths,
    item: &RemoteItem,
    bytes: &[u8],
) -> Result<(), PersistError> {
    fs::create_dir_all(&paths.dir)
        .await
        .map_err(|source| PersistError::io(&paths.dir, source))?;
    write_synced(&paths.data, bytes).await?;
    write_sidecar(&paths.sidecar, item).await?;
    confirm_written(&paths.dir, &[&paths.data, &paths.sidecar]).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::item::{CREATED_AT_SENTINEL, MISSING_AUTHOR};
    use crate::source::{RawPage, SourceDescriptor, SourceError};

    const FAKE: SourceDescriptor = SourceDescriptor {
        name: "fake",
        display_name: "Fake",
    };

    /// Serves fixed bodies per URL and counts fetches.
    #[derive(Default)]
    struct ContentSource {
        bodies: HashMap<String, (u16, Vec<u8>)>,
        fetches: Mutex<Vec<String>>,
    }

    impl ContentSource {
        fn with(mut self, url: &str, status: u16, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), (status, body.to_vec()));
            self
        }
    }

    #[async_trait]
    impl RemoteSource for ContentSource {
        fn descriptor(&self) -> SourceDescriptor {
            FAKE
        }

        async fn list_page(&self, _: Option<&str>, _: u32) -> Result<RawPage, SourceError> {
            Ok(RawPage::default())
        }

        async fn fetch_bytes(&self, url: &str) -> Result<FetchedContent, SourceError> {
            self.fetches.lock().unwrap().push(url.to_string());
            let (status, bytes) = self
                .bodies
                .get(url)
                .cloned()
                .ok_or_else(|| SourceError::timeout(url))?;
            Ok(FetchedContent {
                status,
                final_url: url.to_string(),
                bytes,
            })
        }

        async fn delete_remote(&self, _: &str) -> Result<(), SourceError> {
            Ok(())
        }
    }

    fn engine(source: ContentSource, root: &Path) -> (FetchPersistEngine, Arc<ContentSource>) {
        let source = Arc::new(source);
        let engine = FetchPersistEngine::new(
            Arc::clone(&source) as Arc<dyn RemoteSource>,
            Arc::new(RateLimiter::disabled()),
            Classifier::default(),
            root,
        );
        (engine, source)
    }

    fn item(id: &str, url: &str) -> RemoteItem {
        RemoteItem::new(id, Some(url.to_string()), "poster", 1_600_000_000.0)
    }

    #[tokio::test]
    async fn test_persist_direct_image_writes_both_files() {
        let dir = TempDir::new().unwrap();
        let url = "https://i.redd.it/a.jpg";
        let (engine, _) = engine(ContentSource::default().with(url, 200, b"jpeg"), dir.path());

        let outcome = engine.persist(&item("a1", url)).await;
        let PersistOutcome::Persisted(artifact) = outcome else {
            panic!("expected persisted, got {outcome:?}");
        };
        assert_eq!(artifact.id(), "a1");
        assert_eq!(
            artifact.data_path(),
            dir.path().join("fake/a1/1600000000_poster.jpg")
        );
        assert_eq!(std::fs::read(artifact.data_path()).unwrap(), b"jpeg");
        let sidecar: RemoteItem =
            serde_json::from_slice(&std::fs::read(artifact.sidecar_path()).unwrap()).unwrap();
        assert_eq!(sidecar.id, "a1");
    }

    #[tokio::test]
    async fn test_persist_gifv_refetches_resolved_gif() {
        let dir = TempDir::new().unwrap();
        let page = "https://i.imgur.com/clip.gifv";
        let html = b"<script>var x = { gifUrl: '//i.imgur.com/clip.gif' };</script>";
        let (engine, source) = engine(
            ContentSource::default()
                .with(page, 200, html)
                .with("https://i.imgur.com/clip.gif", 200, b"GIF89a"),
            dir.path(),
        );

        let outcome = engine.persist(&item("g1", page)).await;
        let PersistOutcome::Persisted(artifact) = outcome else {
            panic!("expected persisted, got {outcome:?}");
        };
        assert!(artifact.data_path().to_string_lossy().ends_with("_poster.gif"));
        assert_eq!(std::fs::read(artifact.data_path()).unwrap(), b"GIF89a");
        assert_eq!(source.fetches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_persist_missing_required_field_makes_no_fetch_or_write() {
        let dir = TempDir::new().unwrap();
        let url = "https://i.redd.it/a.jpg";
        let (engine, source) = engine(ContentSource::default().with(url, 200, b"x"), dir.path());

        let mut no_author = item("a1", url);
        no_author.author = MISSING_AUTHOR.to_string();
        let mut no_created = item("a2", url);
        no_created.created_at = CREATED_AT_SENTINEL;

        for record in [no_author, no_created] {
            assert!(matches!(
                engine.persist(&record).await,
                PersistOutcome::Skipped(SkipReason::MissingRequiredField)
            ));
        }
        assert!(source.fetches.lock().unwrap().is_empty());
        assert!(!dir.path().join("fake").exists());
    }

    #[tokio::test]
    async fn test_persist_skip_reasons() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = engine(
            ContentSource::default()
                .with("https://i.redd.it/gone.jpg", 404, b"")
                .with("https://i.imgur.com/bad.gifv", 200, b"<html></html>")
                .with("https://gfycat.com/Clip", 200, b"")
                .with("https://v.redd.it/abc", 200, b""),
            dir.path(),
        );

        let cases = [
            ("https://i.redd.it/gone.jpg", SkipReason::BadStatus),
            ("https://unreachable.example/a.jpg", SkipReason::FetchFailed),
            ("https://i.imgur.com/bad.gifv", SkipReason::ResolutionFailed),
            ("https://gfycat.com/Clip", SkipReason::IgnoredByPolicy),
            ("https://v.redd.it/abc", SkipReason::Unclassified),
        ];
        for (url, expected) in cases {
            let outcome = engine.persist(&item("x", url)).await;
            assert!(
                matches!(outcome, PersistOutcome::Skipped(reason) if reason == expected),
                "{url}: expected {expected}, got {outcome:?}"
            );
        }

        let mut no_url = item("y", "https://i.redd.it/a.jpg");
        no_url.url = None;
        assert!(matches!(
            engine.persist(&no_url).await,
            PersistOutcome::Skipped(SkipReason::NoUrl)
        ));
    }

    #[tokio::test]
    async fn test_persist_sidecar_blocked_fails_without_artifact() {
        let dir = TempDir::new().unwrap();
        let url = "https://i.redd.it/a.jpg";
        let (engine, _) = engine(ContentSource::default().with(url, 200, b"x"), dir.path());
        std::fs::create_dir_all(
            dir.path()
                .join("fake/a1/1600000000_poster.jpg_metadata.json"),
        )
        .unwrap();

        let outcome = engine.persist(&item("a1", url)).await;
        assert!(matches!(outcome, PersistOutcome::Failed(PersistError::Io { .. })));
    }

    #[tokio::test]
    async fn test_persist_rejects_id_that_needs_sanitizing() {
        let dir = TempDir::new().unwrap();
        let url = "https://i.redd.it/a.jpg";
        let (engine, source) = engine(ContentSource::default().with(url, 200, b"x"), dir.path());

        for id in ["x y", "../escape", "a/b", " padded"] {
            let outcome = engine.persist(&item(id, url)).await;
            assert!(
                matches!(outcome, PersistOutcome::Skipped(SkipReason::InvalidId)),
                "{id:?}: got {outcome:?}"
            );
        }
        assert!(source.fetches.lock().unwrap().is_empty());
        assert!(!dir.path().join("fake").exists());
    }

    #[tokio::test]
    async fn test_persist_wrapped_asset_keeps_target_extension_on_mismatch() {
        let dir = TempDir::new().unwrap();
        let page = "https://i.imgur.com/clip.gifv";
        let html = b"<script>var x = { gifUrl: '//i.imgur.com/clip.mp4' };</script>";
        let (engine, _) = engine(
            ContentSource::default()
                .with(page, 200, html)
                .with("https://i.imgur.com/clip.mp4", 200, b"mp4"),
            dir.path(),
        );

        let outcome = engine.persist(&item("g2", page)).await;
        let PersistOutcome::Persisted(artifact) = outcome else {
            panic!("expected persisted, got {outcome:?}");
        };
        assert!(artifact.data_path().to_string_lossy().ends_with("_poster.gif"));
        assert_eq!(std::fs::read(artifact.data_path()).unwrap(), b"mp4");
    }

    #[test]
    fn test_skip_reason_labels() {
        assert_eq!(SkipReason::InvalidId.as_str(), "invalid-id");
        assert_eq!(SkipReason::MissingRequiredField.to_string(), "missing-required-field");
        assert_eq!(SkipReason::IgnoredByPolicy.as_str(), "ignored-by-policy");
    }
}
