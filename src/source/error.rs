//! Error types for remote source collaborators.

use thiserror::Error;

/// Errors returned by a [`RemoteSource`](super::RemoteSource) call.
///
/// Page fetches and item fetches surface these as transient failures; the
/// caller decides whether to retry. Delete calls surface them as per-id
/// retirement failures.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error calling {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout calling {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response from an API endpoint.
    #[error("HTTP {status} calling {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The response body could not be interpreted.
    #[error("invalid response from {url}: {reason}")]
    InvalidResponse {
        /// The URL that returned the body.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The source does not offer this operation.
    #[error("{source_name} does not support {operation}")]
    Unsupported {
        source_name: String,
        operation: &'static str,
    },
}

impl SourceError {
    /// Maps a reqwest error, keeping timeouts distinct from other network failures.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(source_name: impl Into<String>, operation: &'static str) -> Self {
        Self::Unsupported {
            source_name: source_name.into(),
            operation,
        }
    }
}

/// Fatal authentication failures. Any of these aborts the run for the source.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A credential required by the source was not configured.
    #[error("[AUTH] missing credential `{key}` for source {source_name}")]
    MissingCredential {
        /// Source being authenticated.
        source_name: String,
        /// Credential key that was absent.
        key: &'static str,
    },

    /// The remote rejected the supplied credentials.
    #[error("[AUTH] credentials rejected by {source_name}: {reason}")]
    Rejected {
        /// Source being authenticated.
        source_name: String,
        /// Reason reported by the remote.
        reason: String,
    },

    /// The authentication call itself failed.
    #[error("[AUTH] authentication request for {source_name} failed: {source}")]
    Request {
        /// Source being authenticated.
        source_name: String,
        /// Underlying call failure.
        #[source]
        source: SourceError,
    },
}

impl AuthError {
    pub fn missing_credential(source_name: impl Into<String>, key: &'static str) -> Self {
        Self::MissingCredential {
            source_name: source_name.into(),
            key,
        }
    }

    pub fn rejected(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn request(source_name: impl Into<String>, source: SourceError) -> Self {
        Self::Request {
            source_name: source_name.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_http_status_display() {
        let error = SourceError::http_status("https://oauth.example.com/r/pics/top", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(msg.contains("/r/pics/top"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_source_error_timeout_display() {
        let msg = SourceError::timeout("https://i.example.com/a.jpg").to_string();
        assert!(msg.contains("timeout"));
        assert!(msg.contains("a.jpg"));
    }

    #[test]
    fn test_source_error_unsupported_display() {
        let msg = SourceError::unsupported("drive", "delete").to_string();
        assert_eq!(msg, "drive does not support delete");
    }

    #[test]
    fn test_auth_error_missing_credential_display() {
        let msg = AuthError::missing_credential("reddit", "client_id").to_string();
        assert!(msg.starts_with("[AUTH]"), "Expected [AUTH] prefix in: {msg}");
        assert!(msg.contains("client_id"));
        assert!(msg.contains("reddit"));
    }

    #[test]
    fn test_auth_error_rejected_display() {
        let msg = AuthError::rejected("reddit", "invalid_grant").to_string();
        assert!(msg.contains("invalid_grant"));
    }
}
