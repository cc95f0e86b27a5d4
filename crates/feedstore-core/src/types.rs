//! Record and search-result type definitions

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::highlight::HighlightedString;

/// A subscribed feed, owned by the primary record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub url: String,
    pub title: Option<String>,
    /// User-set title override; takes precedence over `title` when displayed.
    pub user_title: Option<String>,
}

impl Feed {
    pub fn new(url: impl Into<String>) -> Self {
        Feed {
            url: url.into(),
            title: None,
            user_title: None,
        }
    }

    /// The title shown for this feed: the user override if set, else the
    /// feed-provided title.
    pub fn resolved_title(&self) -> Option<&str> {
        self.user_title.as_deref().or(self.title.as_deref())
    }
}

/// One content item of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryContent {
    pub value: String,
    /// MIME type, e.g. `text/html`. `None` is treated as plain text.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl EntryContent {
    pub fn new(value: impl Into<String>) -> Self {
        EntryContent {
            value: value.into(),
            mime_type: None,
            language: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Whether this content item is eligible for the search index.
    ///
    /// Only text-bearing types are indexed; everything else (e.g. enclosed
    /// media markup) is skipped.
    pub fn is_searchable(&self) -> bool {
        match self.mime_type.as_deref() {
            None => true,
            Some(t) => matches!(
                t.to_ascii_lowercase().as_str(),
                "" | "text/plain" | "text/html" | "text/xhtml"
            ),
        }
    }
}

/// An attachment advertised by an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
}

/// A feed entry, owned by the primary record store.
///
/// Identity is `(feed_url, id)`. `last_updated` doubles as the version proxy
/// the search index uses for conflict detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: String,
    pub feed_url: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Vec<EntryContent>,
    pub enclosures: Vec<Enclosure>,
    pub published: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub read: Option<bool>,
    pub important: Option<bool>,
}

impl Entry {
    pub fn new(
        feed_url: impl Into<String>,
        id: impl Into<String>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Entry {
            id: id.into(),
            feed_url: feed_url.into(),
            title: None,
            summary: None,
            content: Vec::new(),
            enclosures: Vec::new(),
            published: None,
            last_updated,
            read: None,
            important: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_content(mut self, content: Vec<EntryContent>) -> Self {
        self.content = content;
        self
    }

    pub fn with_enclosures(mut self, enclosures: Vec<Enclosure>) -> Self {
        self.enclosures = enclosures;
        self
    }

    pub fn with_published(mut self, published: DateTime<Utc>) -> Self {
        self.published = Some(published);
        self
    }
}

/// Sort order for search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchSort {
    /// Best rank first; an entry's best-ranked fragment decides its position.
    #[default]
    Relevant,
    /// The primary store's recency order, restricted to matching entries.
    Recent,
    /// One unordered page; not resumable.
    Random,
}

/// One matched entry, with highlighted snippets.
#[derive(Debug, Clone)]
pub struct EntrySearchResult {
    pub entry_id: String,
    pub feed_url: String,
    /// Highlighted metadata fields, keyed by `.title`, `.feed.title` or
    /// `.feed.user_title`.
    pub metadata: BTreeMap<String, HighlightedString>,
    /// Highlighted content fragments in index order, keyed by fragment path
    /// (`.content[i].value`, `.summary`). Entries indexed without any text
    /// fragment contribute nothing here.
    pub content: Vec<(String, HighlightedString)>,
}

/// Aggregate counts over the entries matching a search query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntrySearchCounts {
    pub total: u64,
    pub read: u64,
    pub important: u64,
    pub has_enclosures: u64,
    /// Average matched entries per day over the last 1, 3 and 12 months,
    /// by the entries' recency timestamp.
    pub averages: [f64; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_title_prefers_user_title() {
        let mut feed = Feed::new("http://example.com/feed");
        assert_eq!(feed.resolved_title(), None);

        feed.title = Some("Provided".to_string());
        assert_eq!(feed.resolved_title(), Some("Provided"));

        feed.user_title = Some("Mine".to_string());
        assert_eq!(feed.resolved_title(), Some("Mine"));
    }

    #[test]
    fn test_content_searchable_mime_types() {
        assert!(EntryContent::new("x").is_searchable());
        assert!(EntryContent::new("x").with_mime_type("").is_searchable());
        assert!(EntryContent::new("x").with_mime_type("text/plain").is_searchable());
        assert!(EntryContent::new("x").with_mime_type("text/html").is_searchable());
        assert!(EntryContent::new("x").with_mime_type("Text/HTML").is_searchable());
        assert!(EntryContent::new("x").with_mime_type("text/xhtml").is_searchable());
        assert!(!EntryContent::new("x").with_mime_type("application/json").is_searchable());
        assert!(!EntryContent::new("x").with_mime_type("image/png").is_searchable());
    }

    #[test]
    fn test_content_serde_uses_type_key() {
        let content = EntryContent::new("hello").with_mime_type("text/html");
        let json = serde_json::to_string(&content).unwrap();
        assert!(json.contains("\"type\":\"text/html\""));

        let back: EntryContent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, content);
    }
}
