//! Raw match rows to structured, highlighted results

use std::collections::BTreeMap;

use feedstore_core::{EntrySearchResult, HighlightedString};
use rand::{distr::Alphanumeric, Rng};
use serde::Deserialize;

use crate::error::SearchError;

/// Snippet length, in tokens: roughly 255 letters at the average English
/// word length.
pub(crate) const SNIPPET_TOKENS: i64 = 54;

/// Per-query snippet delimiters.
///
/// Random so they can't collide with literal document text; regenerated for
/// every page query.
pub(crate) struct Marks {
    pub before: String,
    pub after: String,
}

impl Marks {
    pub fn generate() -> Self {
        let mark: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect();
        Marks {
            before: format!(">>>{}>>>", mark),
            after: format!("<<<{}<<<", mark),
        }
    }
}

/// One grouped row coming back from a search page query.
pub(crate) struct ResultRow {
    pub entry_id: String,
    pub feed_url: String,
    pub rank: f64,
    pub title: Option<String>,
    pub feed_title: Option<String>,
    pub is_feed_user_title: bool,
    pub content_json: String,
    pub recent_key: String,
}

/// One fragment snippet within a grouped row's content array.
#[derive(Deserialize)]
struct ContentCell {
    path: Option<String>,
    value: Option<String>,
}

pub(crate) fn format_result(row: &ResultRow, marks: &Marks) -> Result<EntrySearchResult, SearchError> {
    let mut metadata = BTreeMap::new();
    if let Some(title) = non_empty(row.title.as_deref()) {
        metadata.insert(
            ".title".to_string(),
            HighlightedString::extract(title, &marks.before, &marks.after)?,
        );
    }
    if let Some(feed_title) = non_empty(row.feed_title.as_deref()) {
        let key = if row.is_feed_user_title {
            ".feed.user_title"
        } else {
            ".feed.title"
        };
        metadata.insert(
            key.to_string(),
            HighlightedString::extract(feed_title, &marks.before, &marks.after)?,
        );
    }

    let cells: Vec<ContentCell> = serde_json::from_str(&row.content_json)?;
    let mut content = Vec::with_capacity(cells.len());
    for cell in cells {
        // a null path is the no-text placeholder row; nothing to show
        let Some(path) = cell.path else { continue };
        let value = cell.value.unwrap_or_default();
        content.push((
            path,
            HighlightedString::extract(&value, &marks.before, &marks.after)?,
        ));
    }

    Ok(EntrySearchResult {
        entry_id: row.entry_id.clone(),
        feed_url: row.feed_url.clone(),
        metadata,
        content,
    })
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}
