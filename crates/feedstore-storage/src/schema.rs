//! Primary store schema

use rusqlite::Connection;

use crate::connection::StorageError;

/// Create the feeds/entries tables if they don't exist.
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS feeds (
            url TEXT PRIMARY KEY NOT NULL,
            title TEXT,
            user_title TEXT,
            added TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS feed_tags (
            feed TEXT NOT NULL REFERENCES feeds(url)
                ON UPDATE CASCADE ON DELETE CASCADE,
            tag TEXT NOT NULL,
            PRIMARY KEY (feed, tag)
        );

        CREATE TABLE IF NOT EXISTS entries (
            id TEXT NOT NULL,
            feed TEXT NOT NULL REFERENCES feeds(url)
                ON UPDATE CASCADE ON DELETE CASCADE,
            title TEXT,
            summary TEXT,
            content TEXT,
            enclosures TEXT,
            published TEXT,
            last_updated TEXT NOT NULL,
            read INTEGER,
            important INTEGER,
            PRIMARY KEY (id, feed)
        );

        CREATE INDEX IF NOT EXISTS idx_entries_feed ON entries(feed);
        CREATE INDEX IF NOT EXISTS idx_entries_recent
            ON entries(coalesce(published, last_updated) DESC);",
    )?;
    Ok(())
}
