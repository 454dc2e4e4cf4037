//! The original → published URL association built during a run.
//!
//! Entries are appended once per distinct candidate URL, in extraction
//! order, and never modified afterwards. The output writer reads the table
//! twice: once to substitute values into the spreadsheet, once to write the
//! standalone mapping file.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Lifecycle of one candidate URL.
///
/// ```text
/// Pending ──▶ Fetched ──▶ Uploaded
///    │           │
///    ▼           ▼
/// FetchFailed  UploadFailed
/// ```
///
/// No transition is retried within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Fetched,
    Uploaded,
    FetchFailed,
    UploadFailed,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemState::Uploaded | ItemState::FetchFailed | ItemState::UploadFailed
        )
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    pub fn can_advance_to(self, next: ItemState) -> bool {
        matches!(
            (self, next),
            (ItemState::Pending, ItemState::Fetched)
                | (ItemState::Pending, ItemState::FetchFailed)
                | (ItemState::Fetched, ItemState::Uploaded)
                | (ItemState::Fetched, ItemState::UploadFailed)
        )
    }
}

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub original_url: String,
    /// Set only when the item reached [`ItemState::Uploaded`].
    pub published_url: Option<String>,
    pub state: ItemState,
    pub error: Option<ItemError>,
}

impl MappingEntry {
    pub fn is_success(&self) -> bool {
        self.published_url.is_some()
    }
}

/// Append-only mapping from original URL to outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for `original_url`.
    ///
    /// A URL that was already recorded keeps its first outcome; the duplicate
    /// is dropped with a warning.
    pub fn record(&mut self, original_url: impl Into<String>, outcome: Result<String, ItemError>) {
        let original_url = original_url.into();
        if self.index.contains_key(&original_url) {
            warn!("Mapping for {} already recorded; ignoring duplicate", original_url);
            return;
        }
        let entry = match outcome {
            Ok(published) => MappingEntry {
                original_url: original_url.clone(),
                published_url: Some(published),
                state: ItemState::Uploaded,
                error: None,
            },
            Err(err) => MappingEntry {
                original_url: original_url.clone(),
                published_url: None,
                state: match err {
                    ItemError::Fetch { .. } => ItemState::FetchFailed,
                    ItemError::Upload { .. } => ItemState::UploadFailed,
                },
                error: Some(err),
            },
        };
        self.index.insert(original_url, self.entries.len());
        self.entries.push(entry);
    }

    pub fn lookup(&self, original_url: &str) -> Option<&MappingEntry> {
        self.index.get(original_url).map(|&i| &self.entries[i])
    }

    /// Published URL for `original_url`, if it migrated successfully.
    pub fn published(&self, original_url: &str) -> Option<&str> {
        self.lookup(original_url)?.published_url.as_deref()
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, UploadError};

    #[test]
    fn lifecycle_edges() {
        assert!(ItemState::Pending.can_advance_to(ItemState::Fetched));
        assert!(ItemState::Fetched.can_advance_to(ItemState::UploadFailed));
        assert!(!ItemState::Pending.can_advance_to(ItemState::Uploaded));
        assert!(!ItemState::FetchFailed.can_advance_to(ItemState::Fetched));
        assert!(ItemState::Uploaded.is_terminal());
        assert!(!ItemState::Fetched.is_terminal());
    }

    #[test]
    fn record_and_lookup_preserve_order() {
        let mut m = MappingTable::new();
        m.record("b", Ok("B".into()));
        m.record(
            "a",
            Err(ItemError::Fetch {
                url: "a".into(),
                source: FetchError::HttpStatus { status: 404 },
            }),
        );
        m.record(
            "c",
            Err(ItemError::Upload {
                filename: "c.jpg".into(),
                source: UploadError::RepositoryNotFound,
            }),
        );

        let urls: Vec<_> = m.entries().iter().map(|e| e.original_url.as_str()).collect();
        assert_eq!(urls, vec!["b", "a", "c"]);
        assert_eq!(m.published("b"), Some("B"));
        assert_eq!(m.published("a"), None);
        assert_eq!(m.lookup("a").unwrap().state, ItemState::FetchFailed);
        assert_eq!(m.lookup("c").unwrap().state, ItemState::UploadFailed);
        assert!(m.lookup("zzz").is_none());
        assert_eq!(m.success_count(), 1);
    }

    #[test]
    fn duplicate_record_keeps_first() {
        let mut m = MappingTable::new();
        m.record("a", Ok("first".into()));
        m.record("a", Ok("second".into()));
        assert_eq!(m.len(), 1);
        assert_eq!(m.published("a"), Some("first"));
    }
}
