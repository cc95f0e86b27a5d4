//! Filter options applied to search queries

/// Filter over an optional boolean attribute.
///
/// The attribute has three storage states (true, false, unset), which makes
/// six resolvable filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TristateFilter {
    #[default]
    Any,
    IsTrue,
    IsFalse,
    NotSet,
    /// False or unset.
    NotTrue,
    /// True or unset.
    NotFalse,
}

impl TristateFilter {
    /// The conventional boolean shorthand: `Some(true)` means "is true",
    /// `Some(false)` means "not true" (false *or* never set).
    pub fn from_bool(value: Option<bool>) -> Self {
        match value {
            None => TristateFilter::Any,
            Some(true) => TristateFilter::IsTrue,
            Some(false) => TristateFilter::NotTrue,
        }
    }
}

/// One term of a feed-tag filter group, e.g. `news` or `-muted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTerm {
    pub negated: bool,
    pub tag: String,
}

impl TagTerm {
    pub fn new(tag: impl Into<String>) -> Self {
        TagTerm {
            negated: false,
            tag: tag.into(),
        }
    }

    pub fn negated(tag: impl Into<String>) -> Self {
        TagTerm {
            negated: true,
            tag: tag.into(),
        }
    }

    /// Parse a `tag` / `-tag` string. Returns `None` for an empty tag.
    pub fn parse(s: &str) -> Option<Self> {
        let (negated, tag) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if tag.is_empty() {
            return None;
        }
        Some(TagTerm {
            negated,
            tag: tag.to_string(),
        })
    }
}

/// Options for filtering searched entries.
///
/// `feed_tags` is an AND of groups; each group is an OR of possibly-negated
/// tags on the entry's feed.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub feed_url: Option<String>,
    pub read: TristateFilter,
    pub important: TristateFilter,
    pub has_enclosures: Option<bool>,
    pub feed_tags: Vec<Vec<TagTerm>>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, feed_url: impl Into<String>) -> Self {
        self.feed_url = Some(feed_url.into());
        self
    }

    pub fn with_read(mut self, read: TristateFilter) -> Self {
        self.read = read;
        self
    }

    pub fn with_important(mut self, important: TristateFilter) -> Self {
        self.important = important;
        self
    }

    pub fn with_enclosures(mut self, has_enclosures: bool) -> Self {
        self.has_enclosures = Some(has_enclosures);
        self
    }

    /// Add one OR-group of tag terms; groups are ANDed together.
    pub fn with_tag_group(mut self, group: Vec<TagTerm>) -> Self {
        if !group.is_empty() {
            self.feed_tags.push(group);
        }
        self
    }
}
