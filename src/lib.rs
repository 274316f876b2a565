//! Data Cloner Core Library
//!
//! Mirrors content from remote listing APIs to local storage, then optionally
//! retires (deletes) the remote copy once the local copy is confirmed on disk.
//!
//! # Architecture
//!
//! - [`item`] - Remote item records, missing-field sentinels, ordered item map
//! - [`source`] - Remote collaborator traits, Reddit and Drive sources, source registry
//! - [`classify`] - Content classification and wrapper-page resolution
//! - [`sync`] - Paginator, rate limiter, retry policy, sync orchestrator
//! - [`persist`] - Fetch-persist engine with post-write confirmation
//! - [`retire`] - Retirement set and remote retirement engine
//! - [`config`] - TOML configuration and credential loading

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod config;
pub mod item;
pub mod persist;
pub mod retire;
pub mod source;
pub mod sync;

// Re-export commonly used types
pub use classify::{Classification, Classifier, classify};
pub use config::{AppConfig, ConfigError, LoadedConfig, load_config};
pub use item::{ItemMap, RemoteItem};
pub use persist::{FetchPersistEngine, PersistError, PersistOutcome, PersistedArtifact, SkipReason};
pub use retire::{RetirementEngine, RetirementReport, RetirementSet};
pub use source::{
    AuthError, Authenticator, RemoteSource, SourceDescriptor, SourceError, SourceRegistry,
    build_default_source_registry,
};
pub use sync::{
    RateLimiter, RetryPolicy, SyncError, SyncOptions, SyncOrchestrator, SyncSummary,
};
