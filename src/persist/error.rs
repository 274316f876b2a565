//! Error types for the fetch-persist engine.

use std::path::PathBuf;

use thiserror::Error;

/// Failures writing or confirming a local artifact.
///
/// Any of these means the item's id never reaches the retirement set.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Creating a directory, writing, syncing or scanning failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being operated on.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The item record could not be serialized for the sidecar.
    #[error("failed to serialize metadata for item {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A written file did not show up in the post-write directory scan.
    #[error("write unconfirmed: {path} missing from post-write scan")]
    WriteUnconfirmed {
        /// The path that could not be found.
        path: PathBuf,
    },
}

impl PersistError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn write_unconfirmed(path: impl Into<PathBuf>) -> Self {
        Self::WriteUnconfirmed { path: path.into() }
    }

    /// Failure category as reported in run summaries.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io { .. } | Self::Serialize { .. } => "write-failed",
            Self::WriteUnconfirmed { .. } => "write-unconfirmed",
        }
    }
}
