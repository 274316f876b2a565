//! Explicit source registration table.
//!
//! Each entry maps a source name to a constructor that builds its
//! [`Authenticator`] from the loaded configuration. The table is validated
//! against the configured enabled-source set at startup, so a typo in the
//! config fails fast instead of silently mirroring nothing.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::{AppConfig, ConfigError};

use super::drive::{DRIVE_DESCRIPTOR, DriveAuthenticator};
use super::reddit::{REDDIT_DESCRIPTOR, RedditAuthenticator};
use super::{Authenticator, SourceDescriptor};

/// Constructor signature for registry entries.
pub type BuildAuthenticator = fn(&AppConfig) -> Result<Box<dyn Authenticator>, ConfigError>;

/// Errors produced when resolving enabled sources.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An enabled source has no registry entry.
    #[error("source `{name}` is enabled but not registered (known sources: {known})")]
    UnknownSource {
        /// The unrecognized name.
        name: String,
        /// Comma-separated registered names.
        known: String,
    },

    /// A source's configuration could not produce an authenticator.
    #[error("source `{name}` is misconfigured: {source}")]
    Misconfigured {
        /// Source name.
        name: String,
        /// Underlying config problem.
        #[source]
        source: ConfigError,
    },
}

/// One registered source.
#[derive(Debug, Clone, Copy)]
pub struct SourceEntry {
    pub descriptor: SourceDescriptor,
    pub build: BuildAuthenticator,
}

/// Ordered table of known sources.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    entries: Vec<SourceEntry>,
}

impl SourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source. A later entry with the same name replaces the earlier one.
    pub fn register(&mut self, descriptor: SourceDescriptor, build: BuildAuthenticator) {
        self.entries.retain(|entry| entry.descriptor.name != descriptor.name);
        self.entries.push(SourceEntry { descriptor, build });
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SourceEntry> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.name == name)
    }

    /// Returns registered source names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.descriptor.name).collect()
    }

    /// Resolves `enabled` names to entries, preserving the given order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownSource`] for the first name with no entry.
    #[instrument(skip(self))]
    pub fn resolve_enabled(&self, enabled: &[String]) -> Result<Vec<SourceEntry>, RegistryError> {
        enabled
            .iter()
            .map(|name| {
                self.get(name).copied().ok_or_else(|| RegistryError::UnknownSource {
                    name: name.clone(),
                    known: self.names().join(", "),
                })
            })
            .collect()
    }

    /// Builds authenticators for every enabled source.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when a source is unknown or its config is incomplete.
    pub fn build_enabled(
        &self,
        config: &AppConfig,
        enabled: &[String],
    ) -> Result<Vec<Box<dyn Authenticator>>, RegistryError> {
        self.resolve_enabled(enabled)?
            .into_iter()
            .map(|entry| {
                debug!(source = entry.descriptor.name, "building authenticator");
                (entry.build)(config).map_err(|source| RegistryError::Misconfigured {
                    name: entry.descriptor.name.to_string(),
                    source,
                })
            })
            .collect()
    }
}

/// Builds the registry of every source this binary ships.
#[must_use]
pub fn build_default_source_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(REDDIT_DESCRIPTOR, build_reddit);
    registry.register(DRIVE_DESCRIPTOR, build_drive);
    registry
}

fn build_reddit(config: &AppConfig) -> Result<Box<dyn Authenticator>, ConfigError> {
    let (credentials, settings) = config.reddit_connection()?;
    Ok(Box::new(RedditAuthenticator::new(credentials, settings)))
}

fn build_drive(config: &AppConfig) -> Result<Box<dyn Authenticator>, ConfigError> {
    let (access_token, settings) = config.drive_connection()?;
    Ok(Box::new(DriveAuthenticator::new(access_token, settings)))
}
