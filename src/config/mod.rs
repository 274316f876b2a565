//! TOML-backed application configuration.
//!
//! Loaded once at process start, validated, and passed by shared reference
//! afterwards; nothing mutates it during a run.
//!
//! ```toml
//! destination_root = "/home/me/Downloads/data_cloner"
//! enabled_sources = ["reddit"]
//! retire_remote = ["reddit"]
//! delay_per_action_ms = 3000
//!
//! [reddit]
//! subreddit = "pics"
//! fetch_comments = true
//!
//! [drive]
//! query = "mimeType contains 'image/'"
//! ```

pub mod credentials;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::source::drive::{DEFAULT_DRIVE_API_BASE_URL, DEFAULT_DRIVE_QUERY, DriveSettings};
use crate::source::reddit::{
    DEFAULT_API_BASE_URL, DEFAULT_AUTH_BASE_URL, DEFAULT_SUBMISSIONS_LIMIT, RedditCredentials,
    RedditSettings,
};
use crate::source::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpTimeouts};
use credentials::{
    CredentialMap, DRIVE_ENV_KEYS, REDDIT_ENV_KEYS, overlay_env, read_credentials_file,
};

/// Default pause between outbound calls (matches the remote's tolerance for moderation traffic).
pub const DEFAULT_DELAY_PER_ACTION_MS: u64 = 3000;

/// Default listing page size.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default bound on pages fetched per run.
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Default attempts for transient page failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default project name used to find the credentials line.
pub const DEFAULT_PROJECT_NAME: &str = "data_cloner";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config or credentials file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`AppConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or inconsistent.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Offending key.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Settings for the Reddit source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedditConfig {
    /// Subreddit to mirror. Falls back to the `subreddit` credential key.
    pub subreddit: Option<String>,
    pub submissions_limit: usize,
    pub fetch_comments: bool,
    /// Project-line credentials file. Defaults to `$HOME/.env` when present.
    pub credentials_file: Option<PathBuf>,
    pub project_name: String,
    pub auth_base_url: String,
    pub api_base_url: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            subreddit: None,
            submissions_limit: DEFAULT_SUBMISSIONS_LIMIT,
            fetch_comments: false,
            credentials_file: None,
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

/// Settings for the Google Drive source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveConfig {
    /// Project-line file holding `access_token`. Defaults to `$HOME/.env` when present.
    pub credentials_file: Option<PathBuf>,
    pub project_name: String,
    pub api_base_url: String,
    /// Drive search expression for the listing.
    pub query: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            api_base_url: DEFAULT_DRIVE_API_BASE_URL.to_string(),
            query: DEFAULT_DRIVE_QUERY.to_string(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Root under which `<source>/<item-id>/` directories are created.
    pub destination_root: Option<PathBuf>,
    pub enabled_sources: Vec<String>,
    /// Source names whose confirmed items are deleted remotely.
    pub retire_remote: Vec<String>,
    pub delay_per_action_ms: u64,
    pub page_size: u32,
    pub max_pages: usize,
    pub max_retries: u32,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub log_level: Option<String>,
    pub reddit: RedditConfig,
    pub drive: DriveConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            destination_root: None,
            enabled_sources: vec!["reddit".to_string()],
            retire_remote: Vec::new(),
            delay_per_action_ms: DEFAULT_DELAY_PER_ACTION_MS,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            max_retries: DEFAULT_MAX_RETRIES,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            log_level: None,
            reddit: RedditConfig::default(),
            drive: DriveConfig::default(),
        }
    }
}

/// Config plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Path that was consulted, if one could be resolved.
    pub path: Option<PathBuf>,
    pub config: AppConfig,
    /// Whether `config` was read from disk (false means built-in defaults).
    pub loaded_from_file: bool,
}

impl AppConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, unreadable, or invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::io(path, source))?;
        Self::from_toml_str(&raw, path)
    }

    /// Validates value ranges and cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delay_per_action_ms > 60_000 {
            return Err(ConfigError::invalid(
                "delay_per_action_ms",
                format!("{}. Expected range: 0..=60000", self.delay_per_action_ms),
            ));
        }
        if !(1..=100).contains(&self.page_size) {
            return Err(ConfigError::invalid(
                "page_size",
                format!("{}. Expected range: 1..=100", self.page_size),
            ));
        }
        if !(1..=10_000).contains(&self.max_pages) {
            return Err(ConfigError::invalid(
                "max_pages",
                format!("{}. Expected range: 1..=10000", self.max_pages),
            ));
        }
        if self.max_retries > 10 {
            return Err(ConfigError::invalid(
                "max_retries",
                format!("{}. Expected range: 0..=10", self.max_retries),
            ));
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        for name in &self.retire_remote {
            if !self.enabled_sources.contains(name) {
                return Err(ConfigError::invalid(
                    "retire_remote",
                    format!("`{name}` is not listed in enabled_sources"),
                ));
            }
        }
        Ok(())
    }

    /// Returns whether remote retirement is active for `source_name`.
    #[must_use]
    pub fn retirement_enabled(&self, source_name: &str) -> bool {
        self.retire_remote.iter().any(|name| name == source_name)
    }

    /// Returns the configured destination root, or `$HOME/Downloads/data_cloner`.
    #[must_use]
    pub fn destination_root_or_default(&self) -> PathBuf {
        if let Some(root) = &self.destination_root {
            return root.clone();
        }
        env_var_non_empty_os("HOME").map_or_else(
            || PathBuf::from(DEFAULT_PROJECT_NAME),
            |home| {
                PathBuf::from(home)
                    .join("Downloads")
                    .join(DEFAULT_PROJECT_NAME)
            },
        )
    }

    #[must_use]
    pub fn delay_per_action(&self) -> Duration {
        Duration::from_millis(self.delay_per_action_ms)
    }

    #[must_use]
    pub fn http_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect_secs: self.connect_timeout_secs,
            read_secs: self.read_timeout_secs,
        }
    }

    /// Resolves Reddit credentials and settings from the file and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the credentials file cannot be read or no
    /// subreddit is configured anywhere.
    pub fn reddit_connection(&self) -> Result<(RedditCredentials, RedditSettings), ConfigError> {
        let reddit = &self.reddit;
        let values = credential_values(
            reddit.credentials_file.as_deref(),
            &reddit.project_name,
            &REDDIT_ENV_KEYS,
        )?;
        reddit_connection_from(reddit, &values, self.http_timeouts())
    }

    /// Resolves the Drive bearer token and settings from the file and environment.
    ///
    /// A missing token is left empty here and reported at authentication.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an explicit credentials file cannot be read.
    pub fn drive_connection(&self) -> Result<(String, DriveSettings), ConfigError> {
        let drive = &self.drive;
        let values = credential_values(
            drive.credentials_file.as_deref(),
            &drive.project_name,
            &DRIVE_ENV_KEYS,
        )?;
        let access_token = values.get("access_token").cloned().unwrap_or_default();
        let settings = DriveSettings {
            api_base_url: drive.api_base_url.clone(),
            query: drive.query.trim().to_string(),
            timeouts: self.http_timeouts(),
        };
        Ok((access_token, settings))
    }
}

/// Reads the project line from `explicit` (required) or `$HOME/.env`
/// (optional), then overlays the environment.
fn credential_values(
    explicit: Option<&Path>,
    project: &str,
    env_keys: &[(&str, &str)],
) -> Result<CredentialMap, ConfigError> {
    let file_values = match explicit {
        Some(path) => read_credentials_file(path, project, true)?,
        None => match env_var_non_empty_os("HOME") {
            Some(home) => {
                read_credentials_file(&PathBuf::from(home).join(".env"), project, false)
                    .unwrap_or_else(|error| {
                        debug!(error = %error, "ignoring default credentials file");
                        CredentialMap::new()
                    })
            }
            None => CredentialMap::new(),
        },
    };
    Ok(overlay_env(file_values, env_keys, |name| env::var(name).ok()))
}

/// Builds Reddit credentials and settings from already-merged credential values.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when no subreddit is configured.
pub fn reddit_connection_from(
    reddit: &RedditConfig,
    values: &CredentialMap,
    timeouts: HttpTimeouts,
) -> Result<(RedditCredentials, RedditSettings), ConfigError> {
    let value = |key: &str| values.get(key).cloned().unwrap_or_default();

    let subreddit = reddit
        .subreddit
        .clone()
        .or_else(|| values.get("subreddit").cloned())
        .map(|s| s.trim().trim_start_matches("r/").to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::invalid("reddit.subreddit", "no subreddit configured"))?;

    let credentials = RedditCredentials {
        client_id: value("client_id"),
        client_secret: value("client_secret"),
        username: value("username"),
        password: value("password"),
        user_agent: values.get("user_agent").cloned(),
    };
    let settings = RedditSettings {
        subreddit,
        submissions_limit: reddit.submissions_limit,
        fetch_comments: reddit.fetch_comments,
        auth_base_url: reddit.auth_base_url.clone(),
        api_base_url: reddit.api_base_url.clone(),
        timeouts,
    };
    Ok((credentials, settings))
}

fn validate_timeout_secs(field: &str, value: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("{value}. Expected range: 1..=3600"),
        ));
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/data-cloner/config.toml`
/// 2. `$HOME/.config/data-cloner/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("data-cloner")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("data-cloner")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit` if given (must exist), else the default path if present,
/// else built-in defaults.
///
/// # Errors
///
/// Returns [`ConfigError`] when a file that is consulted fails to load.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: AppConfig::load(path)?,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Ok(LoadedConfig {
            config: AppConfig::load(path_ref)?,
            path,
            loaded_from_file: true,
        }),
        _ => Ok(LoadedConfig {
            path,
            config: AppConfig::default(),
            loaded_from_file: false,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<AppConfig, ConfigError> {
        AppConfig::from_toml_str(raw, Path::new("config.toml"))
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.enabled_sources, ["reddit"]);
        assert!(config.retire_remote.is_empty());
        assert_eq!(config.delay_per_action_ms, 3000);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.max_pages, 50);
        assert_eq!(config.reddit.project_name, "data_cloner");
    }

    #[test]
    fn test_full_config_parses() {
        let config = parse(
            r#"
            destination_root = "/srv/mirror"
            enabled_sources = ["reddit"]
            retire_remote = ["reddit"]
            delay_per_action_ms = 500
            page_size = 25
            max_pages = 4

            [reddit]
            subreddit = "pics"
            fetch_comments = true
            "#,
        )
        .unwrap();
        assert_eq!(config.destination_root_or_default(), PathBuf::from("/srv/mirror"));
        assert!(config.retirement_enabled("reddit"));
        assert!(!config.retirement_enabled("drive"));
        assert_eq!(config.delay_per_action(), Duration::from_millis(500));
        assert_eq!(config.reddit.subreddit.as_deref(), Some("pics"));
        assert!(config.reddit.fetch_comments);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(parse("retire = true"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for raw in [
            "page_size = 0",
            "page_size = 101",
            "max_pages = 0",
            "delay_per_action_ms = 60001",
            "max_retries = 11",
            "read_timeout_secs = 0",
        ] {
            assert!(
                matches!(parse(raw), Err(ConfigError::Invalid { .. })),
                "expected rejection for {raw}"
            );
        }
    }

    #[test]
    fn test_retire_remote_must_be_enabled() {
        let err = parse("enabled_sources = []\nretire_remote = [\"reddit\"]").unwrap_err();
        assert!(err.to_string().contains("retire_remote"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_config(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_pages = 7\n").unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.loaded_from_file);
        assert_eq!(loaded.config.max_pages, 7);
    }

    #[test]
    fn test_reddit_connection_from_values() {
        let values = CredentialMap::from([
            ("client_id".to_string(), "id".to_string()),
            ("client_secret".to_string(), "secret".to_string()),
            ("username".to_string(), "mod".to_string()),
            ("password".to_string(), "pw".to_string()),
            ("subreddit".to_string(), "r/earthporn".to_string()),
        ]);
        let (credentials, settings) =
            reddit_connection_from(&RedditConfig::default(), &values, HttpTimeouts::default())
                .unwrap();
        assert_eq!(credentials.client_id, "id");
        assert_eq!(settings.subreddit, "earthporn");
        assert_eq!(settings.submissions_limit, DEFAULT_SUBMISSIONS_LIMIT);
    }

    #[test]
    fn test_reddit_connection_config_subreddit_wins() {
        let values = CredentialMap::from([("subreddit".to_string(), "other".to_string())]);
        let reddit = RedditConfig {
            subreddit: Some("pics".to_string()),
            ..RedditConfig::default()
        };
        let (_, settings) =
            reddit_connection_from(&reddit, &values, HttpTimeouts::default()).unwrap();
        assert_eq!(settings.subreddit, "pics");
    }

    #[test]
    fn test_drive_section_parses() {
        let config = parse(
            r#"
            enabled_sources = ["reddit", "drive"]

            [drive]
            query = "mimeType contains 'image/'"
            api_base_url = "http://127.0.0.1:9/drive/v3"
            "#,
        )
        .unwrap();
        assert_eq!(config.drive.query, "mimeType contains 'image/'");
        assert_eq!(config.drive.project_name, "data_cloner");
        assert_eq!(parse("").unwrap().drive.query, "trashed=false");
    }

    #[test]
    fn test_drive_connection_reads_token_from_credentials_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("creds.env");
        fs::write(&path, "data_cloner;access_token=ya29.token\n").unwrap();
        let mut config = AppConfig::default();
        config.drive.credentials_file = Some(path);
        config.drive.api_base_url = "http://127.0.0.1:9".to_string();

        let (token, settings) = config.drive_connection().unwrap();
        // DRIVE_ACCESS_TOKEN in the caller's environment would override the file.
        if env::var("DRIVE_ACCESS_TOKEN").is_err() {
            assert_eq!(token, "ya29.token");
        }
        assert_eq!(settings.api_base_url, "http://127.0.0.1:9");
        assert_eq!(settings.query, "trashed=false");
    }

    #[test]
    fn test_drive_connection_explicit_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.drive.credentials_file = Some(dir.path().join("missing.env"));
        assert!(matches!(config.drive_connection(), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_reddit_connection_requires_subreddit() {
        let result = reddit_connection_from(
            &RedditConfig::default(),
            &CredentialMap::new(),
            HttpTimeouts::default(),
        );
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
