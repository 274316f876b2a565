//! Sync orchestrator: authenticate, paginate, persist, optionally retire.
//!
//! ```text
//! Idle -> Authenticated -> Paginating -> PersistingBatch -> Retiring? -> Done
//! ```
//!
//! Only authentication failure aborts a run. Page failures are retried per
//! [`RetryPolicy`] and then end pagination early; item failures are counted
//! and never stop the batch.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::classify::Classifier;
use crate::item::ItemMap;
use crate::persist::{FetchPersistEngine, PersistOutcome, SkipReason};
use crate::retire::{RetirementEngine, RetirementSet};
use crate::source::{AuthError, Authenticator, RemoteSource};

use super::paginator::{PaginationError, Paginator};
use super::rate_limiter::{LISTING_KEY, RateLimiter};
use super::retry::{RetryDecision, RetryPolicy, classify_error, retry_after_hint};

/// Orchestrator states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Authenticated,
    Paginating,
    PersistingBatch,
    Retiring,
    Done,
}

impl SyncState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Authenticated => "authenticated",
            Self::Paginating => "paginating",
            Self::PersistingBatch => "persisting-batch",
            Self::Retiring => "retiring",
            Self::Done => "done",
        }
    }
}

/// Fatal sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Per-run knobs, fixed before the run starts.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Root under which `<source-name>/` is created.
    pub destination_root: PathBuf,
    pub page_size: u32,
    pub max_pages: usize,
    pub retry: RetryPolicy,
    /// Whether confirmed items are deleted remotely.
    pub retire_remote: bool,
    pub classifier: Classifier,
}

/// Aggregate counters reported when a run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub source: String,
    pub pages_fetched: usize,
    /// Distinct item ids accumulated during pagination.
    pub items_seen: usize,
    pub persisted: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Persist failures by category (`write-failed`, `write-unconfirmed`).
    pub failed: BTreeMap<&'static str, usize>,
    /// Size of the retirement set, whether or not it was drained.
    pub retirement_candidates: usize,
    pub retired: usize,
    pub retirement_failed: usize,
    /// Page fetches that failed after retries, or ended on a repeated cursor.
    pub page_failures: usize,
    /// Pagination stopped at `max_pages` with more pages available.
    pub page_limit_reached: bool,
    pub interrupted: bool,
}

impl SyncSummary {
    #[must_use]
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    #[must_use]
    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }

    fn record(&mut self, outcome: &PersistOutcome) {
        match outcome {
            PersistOutcome::Persisted(_) => self.persisted += 1,
            PersistOutcome::Skipped(reason) => *self.skipped.entry(*reason).or_insert(0) += 1,
            PersistOutcome::Failed(error) => *self.failed.entry(error.category()).or_insert(0) += 1,
        }
    }
}

/// Drives one source through a full sync run.
#[derive(Debug)]
pub struct SyncOrchestrator {
    options: SyncOptions,
    limiter: Arc<RateLimiter>,
    interrupted: Arc<AtomicBool>,
}

impl SyncOrchestrator {
    /// `limiter` is shared process-wide; `interrupted` is the Ctrl-C flag.
    #[must_use]
    pub fn new(options: SyncOptions, limiter: Arc<RateLimiter>, interrupted: Arc<AtomicBool>) -> Self {
        Self {
            options,
            limiter,
            interrupted,
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Runs the full state machine against one source.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Auth`] if authentication fails; nothing else is fatal.
    #[instrument(skip(self, authenticator), fields(source = authenticator.descriptor().name))]
    pub async fn run(&self, authenticator: &dyn Authenticator) -> Result<SyncSummary, SyncError> {
        let descriptor = authenticator.descriptor();
        let mut summary = SyncSummary {
            source: descriptor.name.to_string(),
            ..SyncSummary::default()
        };
        let mut state = SyncState::Idle;
        debug!(state = state.as_str(), "sync starting");

        let source: Arc<dyn RemoteSource> =
            Arc::from(authenticator.authenticate(Arc::clone(&self.limiter)).await?);
        transition(&mut state, SyncState::Authenticated);

        transition(&mut state, SyncState::Paginating);
        let items = self.paginate(Arc::clone(&source), &mut summary).await;
        summary.items_seen = items.len();

        let mut retirement_set = RetirementSet::new();
        if !summary.interrupted {
            transition(&mut state, SyncState::PersistingBatch);
            let engine = FetchPersistEngine::new(
                Arc::clone(&source),
                Arc::clone(&self.limiter),
                self.options.classifier.clone(),
                &self.options.destination_root,
            );
            for item in items.iter() {
                if self.is_interrupted() {
                    warn!("interrupted, stopping before next item");
                    summary.interrupted = true;
                    break;
                }
                let outcome = engine.persist(item).await;
                summary.record(&outcome);
                if let PersistOutcome::Persisted(artifact) = &outcome {
                    retirement_set.confirm(artifact);
                }
            }
        }
        summary.retirement_candidates = retirement_set.len();

        if self.options.retire_remote && !summary.interrupted {
            transition(&mut state, SyncState::Retiring);
            let engine = RetirementEngine::new(
                Arc::clone(&source),
                Arc::clone(&self.limiter),
                Arc::clone(&self.interrupted),
            );
            let report = engine.retire(&retirement_set).await;
            summary.retired = report.retired_count();
            summary.retirement_failed = report.failed.len();
            summary.interrupted |= report.interrupted;
        } else if self.options.retire_remote {
            warn!(
                candidates = retirement_set.len(),
                "retirement skipped because the run was interrupted"
            );
        } else {
            debug!(candidates = retirement_set.len(), "retirement disabled");
        }

        transition(&mut state, SyncState::Done);
        info!(
            pages = summary.pages_fetched,
            items = summary.items_seen,
            persisted = summary.persisted,
            skipped = summary.skipped_total(),
            failed = summary.failed_total(),
            retired = summary.retired,
            interrupted = summary.interrupted,
            "sync finished"
        );
        Ok(summary)
    }

    /// Pages until the listing ends, retries run out, or the run is interrupted.
    async fn paginate(&self, source: Arc<dyn RemoteSource>, summary: &mut SyncSummary) -> ItemMap {
        let mut paginator = Paginator::new(
            source,
            Arc::clone(&self.limiter),
            self.options.page_size,
            self.options.max_pages,
        );
        let mut items = ItemMap::new();
        let mut attempt = 1;

        loop {
            if self.is_interrupted() {
                warn!("interrupted, stopping pagination");
                summary.interrupted = true;
                break;
            }

            match paginator.next_page().await {
                Ok(Some(page)) => {
                    attempt = 1;
                    items.extend(page);
                }
                Ok(None) => break,
                Err(PaginationError::Transient { cursor, source }) => {
                    let failure = classify_error(&source);
                    match self.options.retry.should_retry(failure, attempt) {
                        RetryDecision::Retry {
                            delay,
                            attempt: next,
                        } => {
                            let delay = retry_after_hint(&source).map_or(delay, |hint| hint.max(delay));
                            warn!(
                                ?cursor,
                                error = %source,
                                attempt = next,
                                delay_ms = delay.as_millis(),
                                "page fetch failed, retrying"
                            );
                            if self.limiter.is_disabled() {
                                tokio::time::sleep(delay).await;
                            } else {
                                self.limiter.record_rate_limit(LISTING_KEY, delay).await;
                            }
                            attempt = next;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            warn!(
                                ?cursor,
                                error = %source,
                                reason = %reason,
                                "page fetch failed, continuing with items already listed"
                            );
                            summary.page_failures += 1;
                            break;
                        }
                    }
                }
                Err(error @ PaginationError::PageLimitExceeded { .. }) => {
                    warn!(error = %error, "stopping pagination");
                    summary.page_limit_reached = true;
                    break;
                }
                Err(error @ PaginationError::RepeatedCursor { .. }) => {
                    warn!(error = %error, "stopping pagination");
                    summary.page_failures += 1;
                    break;
                }
            }
        }

        summary.pages_fetched = paginator.pages_fetched();
        items
    }
}

fn transition(state: &mut SyncState, next: SyncState) {
    debug!(from = state.as_str(), to = next.as_str(), "sync state transition");
    *state = next;
}
