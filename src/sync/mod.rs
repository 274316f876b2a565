//! Sync pipeline: pagination, pacing, retries and the orchestrator.

mod orchestrator;
mod paginator;
pub mod rate_limiter;
mod retry;

pub use orchestrator::{SyncError, SyncOptions, SyncOrchestrator, SyncState, SyncSummary};
pub use paginator::{Cursor, PaginationError, Paginator};
pub use rate_limiter::{LISTING_KEY, RETIRE_KEY, RateLimiter, content_key, parse_retry_after};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error, retry_after_hint};
