//! Remote item records and the ordered per-run item mapping.
//!
//! Sources never fail on a missing optional field: every absent value resolves
//! to an explicit sentinel so downstream code can branch on "field absent"
//! without threading `Option` through the pipeline. Only `url` stays optional,
//! because an item without a URL has nothing to mirror.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel for a record whose source omitted the item id.
pub const MISSING_ID: &str = "no_id";

/// Sentinel for a record whose source omitted the author name.
pub const MISSING_AUTHOR: &str = "no_author";

/// Sentinel creation timestamp for records whose source omitted it.
pub const CREATED_AT_SENTINEL: f64 = 123_456_789.0;

/// Builds the sentinel string for a missing descriptive field, e.g. `no_media_title`.
#[must_use]
pub fn missing_field(prefix: &str, field: &str) -> String {
    format!("no_{prefix}_{field}")
}

/// Fields captured for a single comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentFields {
    pub body: String,
    pub link_id: String,
    pub name: String,
    pub parent_id: String,
    pub permalink: String,
}

impl CommentFields {
    /// Returns a comment with every field set to its missing-field sentinel.
    #[must_use]
    pub fn missing() -> Self {
        Self {
            body: missing_field("comment", "body"),
            link_id: missing_field("comment", "link_id"),
            name: missing_field("comment", "name"),
            parent_id: missing_field("comment", "parent_id"),
            permalink: missing_field("comment", "permalink"),
        }
    }
}

/// One metadata record produced by a remote listing page.
///
/// Immutable once constructed; serialized verbatim into the sidecar file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Source-assigned identity, unique within one sync run.
    pub id: String,
    /// Content URL. Items without one are skipped.
    pub url: Option<String>,
    pub author: String,
    /// Creation time in seconds since the epoch.
    pub created_at: f64,
    /// Descriptive media fields, each defaulted to a sentinel string.
    pub media: BTreeMap<String, Value>,
    /// Comment id to comment fields.
    pub comments: BTreeMap<String, CommentFields>,
}

impl RemoteItem {
    /// Creates an item with empty media and comment mappings.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        url: Option<String>,
        author: impl Into<String>,
        created_at: f64,
    ) -> Self {
        Self {
            id: id.into(),
            url,
            author: author.into(),
            created_at,
            media: BTreeMap::new(),
            comments: BTreeMap::new(),
        }
    }

    /// Returns the name of the first required field that holds a sentinel.
    ///
    /// `id`, `author` and `created_at` feed the on-disk layout, so an item
    /// missing any of them can never be persisted.
    #[must_use]
    pub fn missing_required_field(&self) -> Option<&'static str> {
        if self.id.trim().is_empty() || self.id == MISSING_ID {
            return Some("id");
        }
        if self.author.trim().is_empty() || self.author == MISSING_AUTHOR {
            return Some("author");
        }
        if !self.created_at.is_finite() || self.created_at == CREATED_AT_SENTINEL {
            return Some("created_at");
        }
        None
    }
}

/// Insertion-ordered mapping of item id to item for one sync run.
///
/// Inserting an id that is already present replaces the stored record in
/// place (last write wins) and keeps the original position, so re-fetching a
/// page never duplicates entries.
#[derive(Debug, Default, Clone)]
pub struct ItemMap {
    items: Vec<RemoteItem>,
    index: HashMap<String, usize>,
}

impl ItemMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an item. Returns `true` when the id was new.
    pub fn insert(&mut self, item: RemoteItem) -> bool {
        if let Some(&position) = self.index.get(&item.id) {
            self.items[position] = item;
            return false;
        }
        self.index.insert(item.id.clone(), self.items.len());
        self.items.push(item);
        true
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RemoteItem> {
        self.index.get(id).map(|&position| &self.items[position])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates items in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &RemoteItem> {
        self.items.iter()
    }
}

impl Extend<RemoteItem> for ItemMap {
    fn extend<T: IntoIterator<Item = RemoteItem>>(&mut self, iter: T) {
        for item in iter {
            self.insert(item);
        }
    }
}
