//! Remote retirement of confirmed items.
//!
//! [`RetirementSet`] only grows through [`RetirementSet::confirm`], which takes
//! a [`PersistedArtifact`]; [`RetirementEngine::retire`] only drains a
//! `RetirementSet`. So a delete call is never reachable for an id whose local
//! copy was not confirmed on disk.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::persist::PersistedArtifact;
use crate::source::{RemoteSource, SourceError};
use crate::sync::{RETIRE_KEY, RateLimiter};

/// Ordered, duplicate-free set of ids whose local artifacts are confirmed.
#[derive(Debug, Default, Clone)]
pub struct RetirementSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl RetirementSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the artifact's id. Returns false if it was already present.
    pub fn confirm(&mut self, artifact: &PersistedArtifact) -> bool {
        let id = artifact.id();
        if self.members.contains(id) {
            return false;
        }
        self.members.insert(id.to_string());
        self.order.push(id.to_string());
        true
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in confirmation order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// Outcome of draining a retirement set.
#[derive(Debug, Default)]
pub struct RetirementReport {
    /// Ids whose delete call succeeded, in call order.
    pub retired: Vec<String>,
    /// Ids whose delete call failed, with the error.
    pub failed: Vec<(String, SourceError)>,
    /// Set when an interrupt stopped the batch early.
    pub interrupted: bool,
}

impl RetirementReport {
    #[must_use]
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }
}

/// Issues rate-limited delete calls, one at a time.
pub struct RetirementEngine {
    source: Arc<dyn RemoteSource>,
    limiter: Arc<RateLimiter>,
    interrupted: Arc<AtomicBool>,
}

impl std::fmt::Debug for RetirementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetirementEngine")
            .field("source", &self.source.descriptor().name)
            .finish_non_exhaustive()
    }
}

impl RetirementEngine {
    #[must_use]
    pub fn new(
        source: Arc<dyn RemoteSource>,
        limiter: Arc<RateLimiter>,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            limiter,
            interrupted,
        }
    }

    /// Deletes every id in `set`, in order.
    ///
    /// Individual failures are logged and recorded; they never stop the batch
    /// and are not retried. An interrupt stops the batch between calls.
    #[instrument(skip(self, set), fields(source = self.source.descriptor().name, candidates = set.len()))]
    pub async fn retire(&self, set: &RetirementSet) -> RetirementReport {
        let mut report = RetirementReport::default();

        for id in set.ids() {
            if self.interrupted.load(Ordering::SeqCst) {
                warn!(remaining = set.len() - report.retired.len() - report.failed.len(), "retirement interrupted");
                report.interrupted = true;
                break;
            }

            self.limiter.acquire(RETIRE_KEY).await;
            match self.source.delete_remote(id).await {
                Ok(()) => {
                    debug!(item_id = id, "remote copy retired");
                    report.retired.push(id.to_string());
                }
                Err(error) => {
                    warn!(item_id = id, error = %error, "remote retirement failed");
                    report.failed.push((id.to_string(), error));
                }
            }
        }

        info!(
            retired = report.retired.len(),
            failed = report.failed.len(),
            "retirement finished"
        );
        report
    }
}
