//! Payload scanners for wrapper pages.
//!
//! Some hosts answer a media URL with an HTML page that embeds the real asset
//! location in a script block. These scanners do one narrow job each: walk the
//! document's text nodes, find the marker, pull out one link. They are not a
//! general HTML scraper and should stay that way.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use url::Url;

/// Marker present in text nodes of embedded-video wrapper pages.
pub const GIF_URL_MARKER: &str = "gifUrl";

/// Marker present in the JSON-LD block of short-clip wrapper pages.
pub const CONTENT_URL_MARKER: &str = "contentUrl";

/// Protocol-relative or absolute http(s) link.
#[allow(clippy::expect_used)]
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:https?:)?//[^\s'"<>,;)]+"#).expect("link pattern is valid")
});

/// `contentUrl` followed by `:` or `=` and a quoted value.
#[allow(clippy::expect_used)]
static CONTENT_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"contentUrl"?\s*[:=]\s*"([^"]+)""#).expect("contentUrl pattern is valid")
});

/// Returns the trimmed, non-empty text nodes of an HTML document, in document order.
fn text_nodes(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .tree
        .values()
        .filter_map(|node| node.as_text())
        .map(|text| {
            let value: &str = text;
            value.trim().to_string()
        })
        .filter(|value| !value.is_empty())
        .collect()
}

/// Normalizes a scanned link to an absolute https URL, rejecting anything
/// that does not parse.
fn normalize_link(raw: &str) -> Option<String> {
    let absolute = if raw.starts_with("//") {
        format!("https:{raw}")
    } else {
        raw.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;
    if parsed.host_str().is_none() {
        return None;
    }
    Some(parsed.to_string())
}

/// Finds the first well-formed link in a text node mentioning `gifUrl`.
#[must_use]
pub fn find_gif_url(html: &str) -> Option<String> {
    text_nodes(html)
        .iter()
        .filter(|text| text.contains(GIF_URL_MARKER))
        .flat_map(|text| {
            // Links after the marker take precedence over earlier ones in the same node.
            let tail = text
                .find(GIF_URL_MARKER)
                .map_or(text.as_str(), |idx| &text[idx..]);
            LINK_PATTERN
                .find_iter(tail)
                .map(|m| m.as_str().to_string())
                .collect::<Vec<_>>()
        })
        .find_map(|candidate| normalize_link(&candidate))
}

/// Extracts the quoted value following `contentUrl` in any text node.
#[must_use]
pub fn find_content_url(html: &str) -> Option<String> {
    text_nodes(html)
        .iter()
        .filter(|text| text.contains(CONTENT_URL_MARKER))
        .flat_map(|text| {
            CONTENT_URL_PATTERN
                .captures_iter(text)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
                .collect::<Vec<_>>()
        })
        .find_map(|candidate| normalize_link(&candidate))
}
