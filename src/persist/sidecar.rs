//! Durable file writes for artifacts and their metadata sidecars.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::item::RemoteItem;

use super::PersistError;

/// Serializes the full item record as pretty JSON.
///
/// # Errors
///
/// Returns [`PersistError::Serialize`] if the record cannot be encoded.
pub fn render_sidecar(item: &RemoteItem) -> Result<Vec<u8>, PersistError> {
    serde_json::to_vec_pretty(item).map_err(|source| PersistError::Serialize {
        id: item.id.clone(),
        source,
    })
}

/// Writes `bytes` to `path`, truncating any previous content, and syncs it
/// to disk before returning. A partially written file is removed.
///
/// # Errors
///
/// Returns [`PersistError::Io`] on any create, write or sync failure.
#[instrument(skip(bytes), fields(path = %path.display(), bytes = bytes.len()))]
pub async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|source| PersistError::io(path, source))?;

    let written = async {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;

    if let Err(source) = written {
        drop(file);
        let _ = fs::remove_file(path).await;
        return Err(PersistError::io(path, source));
    }

    debug!("file written and synced");
    Ok(())
}

/// Writes the sidecar for `item` at `path`.
///
/// # Errors
///
/// Returns [`PersistError`] if serialization or the write fails.
pub async fn write_sidecar(path: &Path, item: &RemoteItem) -> Result<(), PersistError> {
    let body = render_sidecar(item)?;
    write_synced(path, &body).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_write_synced_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jpg");
        write_synced(&path, b"first version").await.unwrap();
        write_synced(&path, b"second").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_write_synced_fails_when_path_is_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taken");
        std::fs::create_dir(&path).unwrap();
        let err = write_synced(&path, b"x").await.unwrap_err();
        assert!(matches!(err, PersistError::Io { .. }));
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_write_sidecar_contains_full_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.json");
        let mut item = RemoteItem::new("abc", Some("https://i.redd.it/a.jpg".to_string()), "me", 2.5);
        item.media
            .insert("error".to_string(), serde_json::json!("no_media"));
        write_sidecar(&path, &item).await.unwrap();

        let parsed: RemoteItem =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed, item);
    }
}
