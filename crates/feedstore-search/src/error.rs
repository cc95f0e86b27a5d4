//! Search error types and storage-engine error classification

use feedstore_core::HighlightError;
use feedstore_storage::StorageError;
use thiserror::Error;

/// Message fragments identifying a malformed match expression.
///
/// FTS5 reports query-syntax problems as plain operational errors; these are
/// the fragments its messages carry.
const QUERY_ERROR_FRAGMENTS: &[&str] = &[
    "fts5: syntax error near",
    "unknown special query",
    "no such column",
    "no such cursor",
    "unterminated string",
];

/// Search index errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("search index is not enabled")]
    NotEnabled,

    #[error("invalid search query: {message}")]
    InvalidQuery { message: String },

    #[error("invalid search cursor: {0}")]
    InvalidCursor(String),

    #[error("storage engine capability missing: {0}")]
    Capability(String),

    #[error("entry not found: {entry_id} ({feed_url})")]
    EntryNotFound { feed_url: String, entry_id: String },

    #[error(transparent)]
    Highlight(#[from] HighlightError),
}

impl From<rusqlite::Error> for SearchError {
    fn from(e: rusqlite::Error) -> Self {
        classify(e)
    }
}

/// Map raw engine errors onto the error kinds callers can act on: a missing
/// index table means "not enabled", a match-expression parse failure means
/// "invalid query", anything else passes through.
fn classify(e: rusqlite::Error) -> SearchError {
    let message = e.to_string();
    let lower = message.to_lowercase();

    if lower.contains("no such table") && lower.contains("entries_search") {
        return SearchError::NotEnabled;
    }
    if QUERY_ERROR_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return SearchError::InvalidQuery { message };
    }
    SearchError::Sqlite(e)
}
