//! Credential loading from a project-line file and the environment.
//!
//! The credentials file holds one line per project:
//!
//! ```text
//! data_cloner;client_id=abc;client_secret=xyz;username=me;password=pw
//! ```
//!
//! The first line mentioning the project name wins. Tokens without `=` are
//! ignored; keys and values are trimmed. Environment variables override
//! anything read from the file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::ConfigError;

/// Environment variable to credential key mapping for the Reddit source.
pub const REDDIT_ENV_KEYS: [(&str, &str); 6] = [
    ("REDDIT_CLIENT_ID", "client_id"),
    ("REDDIT_CLIENT_SECRET", "client_secret"),
    ("REDDIT_USERNAME", "username"),
    ("REDDIT_PASSWORD", "password"),
    ("REDDIT_USER_AGENT", "user_agent"),
    ("REDDIT_SUBREDDIT", "subreddit"),
];

/// Environment variable to credential key mapping for the Drive source.
pub const DRIVE_ENV_KEYS: [(&str, &str); 1] = [("DRIVE_ACCESS_TOKEN", "access_token")];

/// Key/value credentials for one project.
pub type CredentialMap = HashMap<String, String>;

/// Parses the first line of `raw` that mentions `project`.
///
/// Returns `None` when no line mentions the project.
#[must_use]
pub fn parse_project_line(raw: &str, project: &str) -> Option<CredentialMap> {
    let line = raw.lines().find(|line| line.contains(project))?;
    let map = line
        .split(';')
        .filter_map(|token| token.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect();
    Some(map)
}

/// Reads the project line from a credentials file.
///
/// A missing file yields an empty map when `required` is false.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read, or when it is
/// required but missing. Returns [`ConfigError::Invalid`] when the file has no
/// line for `project`.
pub fn read_credentials_file(
    path: &Path,
    project: &str,
    required: bool,
) -> Result<CredentialMap, ConfigError> {
    if !required && !path.exists() {
        debug!(path = %path.display(), "no credentials file, relying on environment");
        return Ok(CredentialMap::new());
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::io(path, source))?;
    parse_project_line(&raw, project).ok_or_else(|| {
        ConfigError::invalid(
            "credentials_file",
            format!("no line for project `{project}` in {}", path.display()),
        )
    })
}

/// Overlays environment values onto `base` using `env_keys`.
///
/// `lookup` is injected so callers (and tests) control the environment.
#[must_use]
pub fn overlay_env<F>(mut base: CredentialMap, env_keys: &[(&str, &str)], lookup: F) -> CredentialMap
where
    F: Fn(&str) -> Option<String>,
{
    for (env_name, key) in env_keys {
        if let Some(value) = lookup(env_name).map(|v| v.trim().to_string()) {
            if !value.is_empty() {
                base.insert((*key).to_string(), value);
            }
        }
    }
    base
}
