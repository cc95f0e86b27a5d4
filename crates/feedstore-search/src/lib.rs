//! feedstore-search - full-text search index over the feedstore primary store
//!
//! The index is a derived, disposable artifact: an FTS5 table of searchable
//! fragments plus a per-entry sync-state table, kept eventually consistent
//! with the feeds/entries tables by maintenance triggers and a chunked
//! `update()` pass. It can be dropped and rebuilt from the primary store at
//! any time.
//!
//! ```no_run
//! use feedstore_search::Search;
//! use feedstore_storage::Storage;
//! use feedstore_core::{EntryFilter, SearchSort};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Storage::open(std::path::Path::new("feeds.db"))?;
//! let search = Search::new(&storage);
//! search.enable()?;
//! search.update()?;
//! for result in search.search("rust", &EntryFilter::new(), SearchSort::Relevant, None, None)? {
//!     let result = result?;
//!     println!("{} ({})", result.entry_id, result.feed_url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod html;

mod capabilities;
mod query;
mod result;
mod schema;
mod sql;
mod sync;

use chrono::{DateTime, Utc};
use feedstore_core::{EntryFilter, EntrySearchCounts, SearchSort};
use feedstore_storage::Storage;

pub use error::SearchError;
pub use query::SearchResults;
pub use sync::UpdateStats;

/// Search provider tightly coupled to the SQLite storage.
///
/// All operations run against the storage's connection; multiple processes
/// sharing one database file may run `update()` concurrently, the sync
/// passes detect and skip each other's work.
pub struct Search<'s> {
    storage: &'s Storage,
}

impl<'s> Search<'s> {
    pub fn new(storage: &'s Storage) -> Self {
        Search { storage }
    }

    pub(crate) fn storage(&self) -> &Storage {
        self.storage
    }

    /// Create the index schema and maintenance triggers, and queue every
    /// existing entry for indexing. Succeeds if already enabled.
    pub fn enable(&self) -> Result<(), SearchError> {
        schema::enable(self.storage.connection())
    }

    /// Drop the maintenance triggers and index tables.
    pub fn disable(&self) -> Result<(), SearchError> {
        schema::disable(self.storage.connection())
    }

    pub fn is_enabled(&self) -> Result<bool, SearchError> {
        schema::is_enabled(self.storage.connection())
    }

    /// Validate that the storage engine meets the minimum version and
    /// feature requirements. `update()` runs this lazily; `enable()` does
    /// not, so enabling works even before the engine has been validated.
    pub fn check_capabilities(&self) -> Result<(), SearchError> {
        capabilities::check(self.storage.connection())
    }

    /// Bring the index up to date: drain pending deletions, then pending
    /// inserts/updates, in bounded chunks, until a full pass processes
    /// nothing.
    pub fn update(&self) -> Result<UpdateStats, SearchError> {
        self.check_capabilities()?;
        sync::update(self.storage)
    }

    /// Search the index.
    ///
    /// Returns a lazy sequence of results; pages of `chunk_size` rows are
    /// fetched as the iterator is consumed. `starting_after` resumes after
    /// a previously returned entry (rejected for [`SearchSort::Random`]).
    pub fn search(
        &self,
        query: &str,
        filter: &EntryFilter,
        sort: SearchSort,
        limit: Option<usize>,
        starting_after: Option<(&str, &str)>,
    ) -> Result<SearchResults<'_, 's>, SearchError> {
        query::search(self, query, filter, sort, limit, starting_after)
    }

    /// Aggregate counts over the matching entries, including per-day
    /// averages over recency windows.
    pub fn search_counts(
        &self,
        query: &str,
        now: DateTime<Utc>,
        filter: &EntryFilter,
    ) -> Result<EntrySearchCounts, SearchError> {
        query::search_counts(self, query, now, filter)
    }
}
