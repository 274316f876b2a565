//! Shared HTTP client construction policy for remote sources.
//!
//! Every outbound call a source makes goes through a client built here, so
//! timeouts, compression and the user-agent stay consistent across the API
//! client and the content client. Timeouts are mandatory: a hung remote must
//! never stall a run indefinitely.

use std::time::Duration;

use reqwest::Client;

/// Default HTTP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (whole request, including body).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Maximum redirect hops followed when fetching content.
const MAX_REDIRECTS: usize = 10;

/// Timeout settings applied to every source client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect_secs: u64,
    pub read_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

/// Returns the default user-agent string: `data-cloner/<version>`.
#[must_use]
pub fn default_user_agent() -> String {
    format!("data-cloner/{}", env!("CARGO_PKG_VERSION"))
}

/// Builds a source HTTP client with the shared timeout policy.
///
/// # Errors
///
/// Returns the reqwest builder error when the TLS backend cannot be initialized.
pub fn build_http_client(
    user_agent: &str,
    timeouts: HttpTimeouts,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .timeout(Duration::from_secs(timeouts.read_secs))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(user_agent.to_string())
        .gzip(true)
        .build()
}
