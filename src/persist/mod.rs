//! Local persistence with post-write confirmation.
//!
//! [`FetchPersistEngine::persist`] fetches an item's content, classifies it,
//! writes the artifact and its metadata sidecar, then re-enumerates the item
//! directory. Only when both written paths show up in that fresh scan does it
//! hand back a [`PersistedArtifact`], which is the only value the retirement
//! set accepts.
//!
//! Layout:
//!
//! ```text
//! <root>/<source-name>/<item-id>/<created_at>_<author>.<ext>
//! <root>/<source-name>/<item-id>/<created_at>_<author>.<ext>_metadata.json
//! ```

mod confirm;
mod engine;
mod error;
pub mod layout;
mod sidecar;

pub use confirm::{confirm_written, scan_files};
pub use engine::{FetchPersistEngine, PersistOutcome, PersistedArtifact, SkipReason};
pub use error::PersistError;
pub use layout::{ArtifactPaths, SIDECAR_SUFFIX, artifact_paths, data_filename, sanitize_component};
pub use sidecar::{render_sidecar, write_sidecar, write_synced};
