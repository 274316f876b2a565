//! Post-write confirmation by fresh directory enumeration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, instrument};

use super::PersistError;

/// Enumerates every regular file under `root`, recursively.
///
/// # Errors
///
/// Returns [`PersistError::Io`] if any directory cannot be read.
pub async fn scan_files(root: &Path) -> Result<HashSet<PathBuf>, PersistError> {
    let mut files = HashSet::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|source| PersistError::io(&dir, source))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| PersistError::io(&dir, source))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|source| PersistError::io(entry.path(), source))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.insert(entry.path());
            }
        }
    }

    Ok(files)
}

/// Confirms every path in `expected` is present as a regular file in a fresh
/// scan of `dir`.
///
/// # Errors
///
/// Returns [`PersistError::WriteUnconfirmed`] naming the first missing path,
/// or [`PersistError::Io`] if the scan itself fails.
#[instrument(skip(expected), fields(dir = %dir.display()))]
pub async fn confirm_written(dir: &Path, expected: &[&Path]) -> Result<(), PersistError> {
    let found = scan_files(dir).await?;
    for path in expected {
        if !found.contains(*path) {
            return Err(PersistError::write_unconfirmed(*path));
        }
    }
    debug!(files = found.len(), "writes confirmed");
    Ok(())
}
