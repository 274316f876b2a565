//! File extension derivation from content URLs.

use url::Url;

/// Extension derived from a URL's trailing path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlExtension {
    /// Lower-cased extension without the leading dot, e.g. `jpg`.
    Known(String),
    /// The trailing segment has no `.` (or nothing after it).
    Missing,
}

impl UrlExtension {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Known(ext) => Some(ext),
            Self::Missing => None,
        }
    }
}

/// Derives the extension of `url` from the text after the last `.` of its
/// final path segment. Query strings and fragments are ignored.
///
/// Unparseable URLs fall back to treating the raw string as a path.
#[must_use]
pub fn extension_of(url: &str) -> UrlExtension {
    let path = Url::parse(url).map_or_else(
        |_| {
            url.split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string()
        },
        |parsed| parsed.path().to_string(),
    );

    let segment = path.rsplit('/').next().unwrap_or_default();
    match segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => UrlExtension::Known(ext.to_ascii_lowercase()),
        _ => UrlExtension::Missing,
    }
}
