//! Read-write storage handle

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::schema;

/// Default number of rows processed per transaction by batch consumers.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Primary store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feed not found: {0}")]
    FeedNotFound(String),

    #[error("feed already exists: {0}")]
    FeedExists(String),

    #[error("entry not found: {entry_id} ({feed_url})")]
    EntryNotFound { feed_url: String, entry_id: String },
}

/// Shared handle to the primary store.
///
/// One handle per worker; the underlying engine serializes writers and allows
/// concurrent readers (WAL). `chunk_size` bounds how many rows batch
/// consumers (like the search index sync) touch per transaction.
pub struct Storage {
    conn: Connection,
    path: Option<PathBuf>,
    chunk_size: usize,
}

impl Storage {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Self::setup(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::setup(conn, None)
    }

    fn setup(conn: Connection, path: Option<PathBuf>) -> Result<Self, StorageError> {
        // WAL keeps readers unblocked while the search sync holds short
        // write transactions; foreign keys must be on so feed renames and
        // deletes cascade into entries (the search triggers observe those
        // cascaded statements).
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        schema::init_schema(&conn)?;

        Ok(Storage {
            conn,
            path,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Override the batch chunk size. A size of 0 means "unchunked" for
    /// queries; batch writers degrade it to 1 to keep transactions bounded.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The underlying connection, shared with the search index.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let storage = Storage::open_in_memory().unwrap();

        let tables: Vec<String> = storage
            .connection()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"feeds".to_string()));
        assert!(tables.contains(&"feed_tags".to_string()));
        assert!(tables.contains(&"entries".to_string()));
    }

    #[test]
    fn test_open_on_disk_is_reopenable() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("feeds.db");

        {
            let storage = Storage::open(&db_path).unwrap();
            storage.add_feed("http://example.com/feed", Some("One")).unwrap();
        }

        let storage = Storage::open(&db_path).unwrap();
        let feed = storage.get_feed("http://example.com/feed").unwrap().unwrap();
        assert_eq!(feed.title.as_deref(), Some("One"));
    }

    #[test]
    fn test_chunk_size_override() {
        let storage = Storage::open_in_memory().unwrap().with_chunk_size(7);
        assert_eq!(storage.chunk_size(), 7);
    }
}
