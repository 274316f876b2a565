//! On-disk layout: `<root>/<source>/<item-id>/<created_at>_<author>.<ext>`.

use std::path::{Path, PathBuf};

use crate::item::RemoteItem;

/// Suffix appended to the data filename to name its sidecar.
pub const SIDECAR_SUFFIX: &str = "_metadata.json";

/// Paths one item's artifact will be written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Per-item directory.
    pub dir: PathBuf,
    pub data: PathBuf,
    pub sidecar: PathBuf,
}

/// Directory holding every item of one source.
#[must_use]
pub fn source_dir(root: &Path, source_name: &str) -> PathBuf {
    root.join(sanitize_component(source_name))
}

/// Builds the artifact paths for `item` stored with `extension`.
#[must_use]
pub fn artifact_paths(source_dir: &Path, item: &RemoteItem, extension: &str) -> ArtifactPaths {
    let dir = source_dir.join(sanitize_component(&item.id));
    let data_name = data_filename(item, extension);
    let sidecar_name = format!("{data_name}{SIDECAR_SUFFIX}");
    ArtifactPaths {
        data: dir.join(&data_name),
        sidecar: dir.join(sidecar_name),
        dir,
    }
}

/// `<created_at>_<author>.<ext>`; `created_at` uses the shortest float display.
#[must_use]
pub fn data_filename(item: &RemoteItem, extension: &str) -> String {
    let author = sanitize_component(&item.author);
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    format!("{}_{author}.{extension}", item.created_at)
}

/// Replaces path separators, reserved and control characters with `_`,
/// collapsing runs. Never returns an empty string or a dot-only name.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\'' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
