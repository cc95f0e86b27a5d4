//! Entry mutations and lookups

use chrono::{DateTime, Utc};
use feedstore_core::{Enclosure, Entry, EntryContent};
use rusqlite::{params, OptionalExtension, Row};

use crate::connection::{Storage, StorageError};

impl Storage {
    /// Insert an entry, or replace it wholesale if `(id, feed)` already
    /// exists. At the storage layer a replace is a delete plus an insert.
    pub fn add_or_replace_entry(&self, entry: &Entry) -> Result<(), StorageError> {
        self.require_feed(&entry.feed_url)?;

        let content = to_json_column(&entry.content)?;
        let enclosures = to_json_column(&entry.enclosures)?;
        self.connection().execute(
            "INSERT OR REPLACE INTO entries
             (id, feed, title, summary, content, enclosures,
              published, last_updated, read, important)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id,
                entry.feed_url,
                entry.title,
                entry.summary,
                content,
                enclosures,
                entry.published.map(|dt| dt.to_rfc3339()),
                entry.last_updated.to_rfc3339(),
                entry.read,
                entry.important,
            ],
        )?;
        Ok(())
    }

    /// Update an existing entry's document fields in place.
    pub fn update_entry(&self, entry: &Entry) -> Result<(), StorageError> {
        let content = to_json_column(&entry.content)?;
        let enclosures = to_json_column(&entry.enclosures)?;
        let changed = self.connection().execute(
            "UPDATE entries
             SET title = ?1, summary = ?2, content = ?3, enclosures = ?4,
                 published = ?5, last_updated = ?6
             WHERE (id, feed) = (?7, ?8)",
            params![
                entry.title,
                entry.summary,
                content,
                enclosures,
                entry.published.map(|dt| dt.to_rfc3339()),
                entry.last_updated.to_rfc3339(),
                entry.id,
                entry.feed_url,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::EntryNotFound {
                feed_url: entry.feed_url.clone(),
                entry_id: entry.id.clone(),
            });
        }
        Ok(())
    }

    pub fn delete_entry(&self, feed_url: &str, entry_id: &str) -> Result<(), StorageError> {
        let changed = self.connection().execute(
            "DELETE FROM entries WHERE (id, feed) = (?1, ?2)",
            params![entry_id, feed_url],
        )?;
        if changed == 0 {
            return Err(StorageError::EntryNotFound {
                feed_url: feed_url.to_string(),
                entry_id: entry_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_entry_read(
        &self,
        feed_url: &str,
        entry_id: &str,
        read: Option<bool>,
    ) -> Result<(), StorageError> {
        self.set_entry_flag(feed_url, entry_id, "read", read)
    }

    pub fn set_entry_important(
        &self,
        feed_url: &str,
        entry_id: &str,
        important: Option<bool>,
    ) -> Result<(), StorageError> {
        self.set_entry_flag(feed_url, entry_id, "important", important)
    }

    fn set_entry_flag(
        &self,
        feed_url: &str,
        entry_id: &str,
        column: &str,
        value: Option<bool>,
    ) -> Result<(), StorageError> {
        // column comes from the two callers above, never from input
        let sql = format!("UPDATE entries SET {column} = ?1 WHERE (id, feed) = (?2, ?3)");
        let changed = self
            .connection()
            .execute(&sql, params![value, entry_id, feed_url])?;
        if changed == 0 {
            return Err(StorageError::EntryNotFound {
                feed_url: feed_url.to_string(),
                entry_id: entry_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn get_entry(&self, feed_url: &str, entry_id: &str) -> Result<Option<Entry>, StorageError> {
        let entry = self
            .connection()
            .query_row(
                "SELECT id, feed, title, summary, content, enclosures,
                        published, last_updated, read, important
                 FROM entries WHERE (id, feed) = (?1, ?2)",
                params![entry_id, feed_url],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// The recency key for one entry, as stored: `coalesce(published,
    /// last_updated)`. This is the sort key `SearchSort::Recent` pages by.
    pub fn recent_sort_key(
        &self,
        feed_url: &str,
        entry_id: &str,
    ) -> Result<Option<String>, StorageError> {
        let key = self
            .connection()
            .query_row(
                "SELECT coalesce(published, last_updated)
                 FROM entries WHERE (id, feed) = (?1, ?2)",
                params![entry_id, feed_url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key)
    }

    pub fn entry_count(&self) -> Result<i64, StorageError> {
        let count = self
            .connection()
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count)
    }

    fn require_feed(&self, url: &str) -> Result<(), StorageError> {
        let exists: bool = self.connection().query_row(
            "SELECT EXISTS (SELECT 1 FROM feeds WHERE url = ?1)",
            params![url],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::FeedNotFound(url.to_string()));
        }
        Ok(())
    }
}

fn to_json_column<T: serde::Serialize>(items: &[T]) -> Result<Option<String>, StorageError> {
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(items)?))
}

fn entry_from_row(row: &Row) -> rusqlite::Result<Entry> {
    let content: Option<String> = row.get(4)?;
    let enclosures: Option<String> = row.get(5)?;
    let published: Option<String> = row.get(6)?;
    let last_updated: String = row.get(7)?;

    Ok(Entry {
        id: row.get(0)?,
        feed_url: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        content: parse_json_column::<EntryContent>(content.as_deref()),
        enclosures: parse_json_column::<Enclosure>(enclosures.as_deref()),
        published: published.as_deref().and_then(parse_datetime),
        last_updated: parse_datetime(&last_updated).unwrap_or_default(),
        read: row.get(8)?,
        important: row.get(9)?,
    })
}

fn parse_json_column<T: serde::de::DeserializeOwned>(json: Option<&str>) -> Vec<T> {
    json.and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_storage() -> Storage {
        let storage = Storage::open_in_memory().unwrap();
        storage.add_feed("http://a.example/feed", Some("A")).unwrap();
        storage
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_add_and_get_entry_round_trip() {
        let storage = make_storage();
        let entry = Entry::new("http://a.example/feed", "one", ts(0))
            .with_title("Title")
            .with_summary("Summary")
            .with_content(vec![
                EntryContent::new("<p>hello</p>").with_mime_type("text/html"),
                EntryContent::new("plain"),
            ])
            .with_published(ts(-100));
        storage.add_or_replace_entry(&entry).unwrap();

        let got = storage.get_entry("http://a.example/feed", "one").unwrap().unwrap();
        assert_eq!(got, entry);
    }

    #[test]
    fn test_add_entry_to_missing_feed_errors() {
        let storage = make_storage();
        let entry = Entry::new("http://missing.example/", "one", ts(0));
        assert!(matches!(
            storage.add_or_replace_entry(&entry),
            Err(StorageError::FeedNotFound(_))
        ));
    }

    #[test]
    fn test_replace_overwrites_fields() {
        let storage = make_storage();
        let entry = Entry::new("http://a.example/feed", "one", ts(0)).with_title("Old");
        storage.add_or_replace_entry(&entry).unwrap();

        let entry = Entry::new("http://a.example/feed", "one", ts(10)).with_title("New");
        storage.add_or_replace_entry(&entry).unwrap();

        let got = storage.get_entry("http://a.example/feed", "one").unwrap().unwrap();
        assert_eq!(got.title.as_deref(), Some("New"));
        assert_eq!(got.last_updated, ts(10));
    }

    #[test]
    fn test_update_missing_entry_errors() {
        let storage = make_storage();
        let entry = Entry::new("http://a.example/feed", "ghost", ts(0));
        assert!(matches!(
            storage.update_entry(&entry),
            Err(StorageError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_read_important_flags() {
        let storage = make_storage();
        let entry = Entry::new("http://a.example/feed", "one", ts(0));
        storage.add_or_replace_entry(&entry).unwrap();

        storage.set_entry_read("http://a.example/feed", "one", Some(true)).unwrap();
        storage.set_entry_important("http://a.example/feed", "one", Some(false)).unwrap();
        let got = storage.get_entry("http://a.example/feed", "one").unwrap().unwrap();
        assert_eq!(got.read, Some(true));
        assert_eq!(got.important, Some(false));

        storage.set_entry_read("http://a.example/feed", "one", None).unwrap();
        let got = storage.get_entry("http://a.example/feed", "one").unwrap().unwrap();
        assert_eq!(got.read, None);
    }

    #[test]
    fn test_delete_feed_cascades_to_entries() {
        let storage = make_storage();
        let entry = Entry::new("http://a.example/feed", "one", ts(0));
        storage.add_or_replace_entry(&entry).unwrap();

        storage.delete_feed("http://a.example/feed").unwrap();
        assert_eq!(storage.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_recent_sort_key_prefers_published() {
        let storage = make_storage();
        let with_published = Entry::new("http://a.example/feed", "one", ts(0))
            .with_published(ts(-100));
        let without_published = Entry::new("http://a.example/feed", "two", ts(50));
        storage.add_or_replace_entry(&with_published).unwrap();
        storage.add_or_replace_entry(&without_published).unwrap();

        assert_eq!(
            storage.recent_sort_key("http://a.example/feed", "one").unwrap(),
            Some(ts(-100).to_rfc3339())
        );
        assert_eq!(
            storage.recent_sort_key("http://a.example/feed", "two").unwrap(),
            Some(ts(50).to_rfc3339())
        );
        assert_eq!(
            storage.recent_sort_key("http://a.example/feed", "ghost").unwrap(),
            None
        );
    }
}
