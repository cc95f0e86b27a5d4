//! Feed mutations and lookups

use chrono::Utc;
use feedstore_core::Feed;
use rusqlite::{params, OptionalExtension};

use crate::connection::{Storage, StorageError};

impl Storage {
    pub fn add_feed(&self, url: &str, title: Option<&str>) -> Result<(), StorageError> {
        let added = Utc::now().to_rfc3339();
        let changed = self.connection().execute(
            "INSERT OR IGNORE INTO feeds (url, title, added) VALUES (?1, ?2, ?3)",
            params![url, title, added],
        )?;
        if changed == 0 {
            return Err(StorageError::FeedExists(url.to_string()));
        }
        Ok(())
    }

    /// Delete a feed; its entries and tags go with it (cascade).
    pub fn delete_feed(&self, url: &str) -> Result<(), StorageError> {
        let changed = self
            .connection()
            .execute("DELETE FROM feeds WHERE url = ?1", params![url])?;
        if changed == 0 {
            return Err(StorageError::FeedNotFound(url.to_string()));
        }
        Ok(())
    }

    /// Rename a feed URL. Entries and tags follow via cascade; the search
    /// index's rename trigger re-points its rows in the same statement.
    pub fn change_feed_url(&self, old: &str, new: &str) -> Result<(), StorageError> {
        let exists: bool = self.connection().query_row(
            "SELECT EXISTS (SELECT 1 FROM feeds WHERE url = ?1)",
            params![new],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StorageError::FeedExists(new.to_string()));
        }
        let changed = self.connection().execute(
            "UPDATE feeds SET url = ?1 WHERE url = ?2",
            params![new, old],
        )?;
        if changed == 0 {
            return Err(StorageError::FeedNotFound(old.to_string()));
        }
        Ok(())
    }

    pub fn set_feed_title(&self, url: &str, title: Option<&str>) -> Result<(), StorageError> {
        let changed = self.connection().execute(
            "UPDATE feeds SET title = ?1 WHERE url = ?2",
            params![title, url],
        )?;
        if changed == 0 {
            return Err(StorageError::FeedNotFound(url.to_string()));
        }
        Ok(())
    }

    pub fn set_feed_user_title(
        &self,
        url: &str,
        user_title: Option<&str>,
    ) -> Result<(), StorageError> {
        let changed = self.connection().execute(
            "UPDATE feeds SET user_title = ?1 WHERE url = ?2",
            params![user_title, url],
        )?;
        if changed == 0 {
            return Err(StorageError::FeedNotFound(url.to_string()));
        }
        Ok(())
    }

    pub fn add_feed_tag(&self, url: &str, tag: &str) -> Result<(), StorageError> {
        let result = self.connection().execute(
            "INSERT OR IGNORE INTO feed_tags (feed, tag) VALUES (?1, ?2)",
            params![url, tag],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(StorageError::FeedNotFound(url.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove_feed_tag(&self, url: &str, tag: &str) -> Result<(), StorageError> {
        self.connection().execute(
            "DELETE FROM feed_tags WHERE (feed, tag) = (?1, ?2)",
            params![url, tag],
        )?;
        Ok(())
    }

    pub fn get_feed_tags(&self, url: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .connection()
            .prepare_cached("SELECT tag FROM feed_tags WHERE feed = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map(params![url], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tags)
    }

    pub fn get_feed(&self, url: &str) -> Result<Option<Feed>, StorageError> {
        let feed = self
            .connection()
            .query_row(
                "SELECT url, title, user_title FROM feeds WHERE url = ?1",
                params![url],
                |row| {
                    Ok(Feed {
                        url: row.get(0)?,
                        title: row.get(1)?,
                        user_title: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(feed)
    }
}

fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    ) && e.to_string().to_lowercase().contains("foreign key")
}
