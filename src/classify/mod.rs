//! Content classification and wrapper resolution.
//!
//! [`Classifier::classify`] looks at a fetched URL and its bytes and decides
//! what the pipeline should do with them. Branches are tried in order and the
//! first match wins:
//!
//! 1. direct media (`gif`, `jpg`, `png`): the bytes are the artifact
//! 2. `gifv` wrapper page: scan for a `gifUrl` link, re-fetch as `gif`
//! 3. short-clip page (URL contains both `gifs` and `watch`): scan for
//!    `contentUrl`, re-fetch as `mp4`
//! 4. ignored host: skipped by policy
//! 5. anything else: unclassified
//!
//! Classification never performs network IO; the fetch-persist engine does
//! the single re-fetch a wrapper needs.

mod extension;
mod wrapper;

pub use extension::{UrlExtension, extension_of};
pub use wrapper::{CONTENT_URL_MARKER, GIF_URL_MARKER, find_content_url, find_gif_url};

use tracing::{debug, instrument};

/// Extensions stored as-is.
pub const DIRECT_EXTENSIONS: [&str; 3] = ["gif", "jpg", "png"];

/// Hosts recognized and deliberately not mirrored.
pub const DEFAULT_IGNORED_HOSTS: [&str; 1] = ["gfycat"];

/// Which wrapper shape was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    /// `.gifv` page with a `gifUrl` pointer.
    EmbeddedGif,
    /// Short-clip page with a `contentUrl` JSON field.
    ContentUrl,
}

impl WrapperKind {
    /// Extension the resolved asset is stored under.
    #[must_use]
    pub fn target_extension(self) -> &'static str {
        match self {
            Self::EmbeddedGif => "gif",
            Self::ContentUrl => "mp4",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmbeddedGif => "gifv",
            Self::ContentUrl => "content-url",
        }
    }
}

/// Outcome of classifying one fetched URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The fetched bytes are the artifact.
    Direct {
        /// Extension to store under.
        extension: String,
    },
    /// The fetched bytes pointed at the real asset.
    Wrapped {
        kind: WrapperKind,
        /// Where the asset lives; must be fetched once more.
        resolved_url: String,
    },
    /// A wrapper shape was recognized but no usable link was found.
    ResolutionFailed { kind: WrapperKind },
    /// Known host that is skipped on purpose.
    IgnoredByPolicy { host: String },
    /// No branch matched.
    Unclassified { extension: UrlExtension },
}

/// Classifier with a configurable ignored-host list.
#[derive(Debug, Clone)]
pub struct Classifier {
    ignored_hosts: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_HOSTS.iter().map(ToString::to_string).collect())
    }
}

impl Classifier {
    #[must_use]
    pub fn new(ignored_hosts: Vec<String>) -> Self {
        Self { ignored_hosts }
    }

    /// Classifies `url` given the bytes fetched from it.
    #[must_use]
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub fn classify(&self, url: &str, bytes: &[u8]) -> Classification {
        let extension = extension_of(url);

        if let Some(ext) = extension.as_str() {
            if DIRECT_EXTENSIONS.contains(&ext) {
                return Classification::Direct {
                    extension: ext.to_string(),
                };
            }
            if ext == "gifv" {
                return resolve(WrapperKind::EmbeddedGif, find_gif_url(&lossy(bytes)));
            }
        }

        if url.contains("gifs") && url.contains("watch") {
            return resolve(WrapperKind::ContentUrl, find_content_url(&lossy(bytes)));
        }

        if url.starts_with("https") {
            if let Some(host) = self.ignored_hosts.iter().find(|h| url.contains(h.as_str())) {
                return Classification::IgnoredByPolicy { host: host.clone() };
            }
        }

        Classification::Unclassified { extension }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn resolve(kind: WrapperKind, link: Option<String>) -> Classification {
    match link {
        Some(resolved_url) => {
            debug!(kind = kind.as_str(), resolved_url = %resolved_url, "wrapper resolved");
            Classification::Wrapped { kind, resolved_url }
        }
        None => {
            debug!(kind = kind.as_str(), "wrapper has no usable link");
            Classification::ResolutionFailed { kind }
        }
    }
}

/// Classifies with the default ignored-host list.
#[must_use]
pub fn classify(url: &str, bytes: &[u8]) -> Classification {
    Classifier::default().classify(url, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIFV_HTML: &[u8] =
        b"<html><script>var image = { gifUrl: '//i.imgur.com/clip.gif' };</script></html>";

    #[test]
    fn test_classify_direct_media() {
        for (url, ext) in [
            ("https://i.redd.it/a.jpg", "jpg"),
            ("https://i.redd.it/a.PNG", "png"),
            ("https://i.imgur.com/a.gif", "gif"),
        ] {
            assert_eq!(
                classify(url, b"\x89PNG"),
                Classification::Direct {
                    extension: ext.to_string()
                }
            );
        }
    }

    #[test]
    fn test_classify_gifv_resolves_to_gif() {
        let result = classify("https://i.imgur.com/clip.gifv", GIFV_HTML);
        let Classification::Wrapped { kind, resolved_url } = result else {
            panic!("expected wrapped, got {result:?}");
        };
        assert_eq!(kind.target_extension(), "gif");
        assert_eq!(resolved_url, "https://i.imgur.com/clip.gif");
    }

    #[test]
    fn test_classify_gifv_without_marker_fails_resolution() {
        let html = b"<html><script>var image = { mp4: '//i.imgur.com/clip.mp4' };</script></html>";
        assert_eq!(
            classify("https://i.imgur.com/clip.gifv", html),
            Classification::ResolutionFailed {
                kind: WrapperKind::EmbeddedGif
            }
        );
    }

    #[test]
    fn test_classify_content_url_resolves_to_mp4() {
        let html = br#"<html><script>contentUrl="https://cdn/x.mp4"</script></html>"#;
        let result = classify("https://x.gifs.example/watch/abc", html);
        let Classification::Wrapped { kind, resolved_url } = result else {
            panic!("expected wrapped, got {result:?}");
        };
        assert_eq!(kind.target_extension(), "mp4");
        assert_eq!(resolved_url, "https://cdn/x.mp4");
    }

    #[test]
    fn test_classify_content_url_missing_fails_resolution() {
        assert_eq!(
            classify("https://x.gifs.example/watch/abc", b"<html></html>"),
            Classification::ResolutionFailed {
                kind: WrapperKind::ContentUrl
            }
        );
    }

    #[test]
    fn test_classify_direct_wins_over_wrapper_markers() {
        assert!(matches!(
            classify("https://gifs.example/watch/a.jpg", b""),
            Classification::Direct { .. }
        ));
    }

    #[test]
    fn test_classify_ignored_host() {
        assert_eq!(
            classify("https://gfycat.com/SomeClip", b""),
            Classification::IgnoredByPolicy {
                host: "gfycat".to_string()
            }
        );
    }

    #[test]
    fn test_classify_ignored_host_requires_https() {
        assert!(matches!(
            classify("http://gfycat.com/SomeClip", b""),
            Classification::Unclassified { .. }
        ));
    }

    #[test]
    fn test_classify_custom_ignored_hosts() {
        let classifier = Classifier::new(vec!["example.org".to_string()]);
        assert!(matches!(
            classifier.classify("https://example.org/page", b""),
            Classification::IgnoredByPolicy { .. }
        ));
        assert!(matches!(
            classifier.classify("https://gfycat.com/x", b""),
            Classification::Unclassified { .. }
        ));
    }

    #[test]
    fn test_classify_unclassified_keeps_extension() {
        assert_eq!(
            classify("https://v.redd.it/abc/DASH_720.mp4", b""),
            Classification::Unclassified {
                extension: UrlExtension::Known("mp4".to_string())
            }
        );
        assert_eq!(
            classify("https://www.reddit.com/gallery/xyz", b""),
            Classification::Unclassified {
                extension: UrlExtension::Missing
            }
        );
    }
}
