//! Keyed rate limiting for outbound calls.
//!
//! Every outbound call (listing page, content fetch, remote delete) acquires a
//! slot on a key before it is sent. Calls on the same key are spaced by at
//! least the configured delay; different keys do not wait for each other.
//! One limiter is shared process-wide, so every source and every stage of a
//! run paces against the same clock.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use cloner_core::sync::{RateLimiter, LISTING_KEY};
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_secs(3));
//!
//! // First call on a key proceeds immediately
//! limiter.acquire(LISTING_KEY).await;
//!
//! // The next call on the same key waits out the delay
//! limiter.acquire(LISTING_KEY).await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Key for listing page requests.
pub const LISTING_KEY: &str = "listing";

/// Key for remote delete calls.
pub const RETIRE_KEY: &str = "retire";

/// Warning threshold for cumulative delay per key (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Keyed rate limiter.
///
/// Designed to be wrapped in `Arc` and shared. Uses `DashMap` for per-key
/// state and `tokio::sync::Mutex` so the read-update of the timing state is
/// atomic per key.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum delay between calls on the same key.
    default_delay: Duration,

    /// Whether rate limiting is disabled (`--rate-limit 0`).
    disabled: bool,

    /// Arc so the `DashMap` shard lock is released before awaiting the inner Mutex.
    keys: DashMap<String, Arc<KeyState>>,
}

#[derive(Debug)]
struct KeyState {
    /// Earliest instant the next call on this key may proceed.
    /// `None` means the key has not been used yet.
    next_allowed: Mutex<Option<Instant>>,

    /// Cumulative delay applied to this key, in milliseconds.
    cumulative_delay_ms: AtomicU64,
}

impl KeyState {
    fn new() -> Self {
        Self {
            next_allowed: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

impl RateLimiter {
    /// Creates a limiter spacing same-key calls by `default_delay`.
    ///
    /// A zero delay yields a disabled limiter.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = default_delay.as_millis()))]
    pub fn new(default_delay: Duration) -> Self {
        if default_delay.is_zero() {
            return Self::disabled();
        }
        debug!("creating rate limiter");
        Self {
            default_delay,
            disabled: false,
            keys: DashMap::new(),
        }
    }

    /// Creates a limiter that never waits.
    #[must_use]
    #[instrument]
    pub fn disabled() -> Self {
        debug!("creating disabled rate limiter");
        Self {
            default_delay: Duration::ZERO,
            disabled: true,
            keys: DashMap::new(),
        }
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    fn state(&self, key: &str) -> Arc<KeyState> {
        self.keys
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(KeyState::new()))
            .clone()
    }

    /// Waits until a call on `key` is allowed, then reserves the next slot.
    ///
    /// The first call on any key proceeds immediately.
    #[instrument(skip(self))]
    pub async fn acquire(&self, key: &str) {
        if self.disabled {
            return;
        }

        let state = self.state(key);
        let mut next_allowed = state.next_allowed.lock().await;

        if let Some(at) = *next_allowed {
            let now = Instant::now();
            if at > now {
                let delay = at - now;
                let cumulative = state.add_cumulative_delay(delay);
                debug!(
                    key,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying rate limit delay"
                );
                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        key,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive rate limiting on this endpoint"
                    );
                }
                tokio::time::sleep(delay).await;
            }
        } else {
            debug!(key, "first call on key - no delay");
        }

        *next_allowed = Some(Instant::now() + self.default_delay);
    }

    /// Records a server-mandated pause (from a Retry-After header) on `key`.
    ///
    /// The next [`acquire`](Self::acquire) on the key waits at least `delay`.
    #[instrument(skip(self))]
    pub async fn record_rate_limit(&self, key: &str, delay: Duration) {
        if self.disabled {
            return;
        }
        let state = self.state(key);
        let mut next_allowed = state.next_allowed.lock().await;
        let until = Instant::now() + delay;
        if next_allowed.is_none_or(|at| at < until) {
            *next_allowed = Some(until);
        }
        let cumulative = state.add_cumulative_delay(delay);
        debug!(
            key,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server rate limit"
        );
        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                key,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive server rate limiting - remote may be throttling this account"
            );
        }
    }
}

/// Rate-limit key for content fetched from `url`: `content:<host>`.
///
/// Malformed URLs share the `content:unknown` key so they are still paced.
#[must_use]
pub fn content_key(url: &str) -> String {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string());
    format!("content:{host}")
}

/// Parses a Retry-After header value.
///
/// Supports integer seconds and HTTP-date. Returns `None` if unparseable;
/// caps values at 1 hour; past dates yield zero.
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        match datetime.duration_since(std::time::SystemTime::now()) {
            Ok(duration) if duration > MAX_RETRY_AFTER => {
                warn!(
                    delay_secs = duration.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                Some(MAX_RETRY_AFTER)
            }
            Ok(duration) => Some(duration),
            Err(_) => {
                debug!(header_value, "Retry-After date is in the past, returning zero");
                Some(Duration::ZERO)
            }
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}
