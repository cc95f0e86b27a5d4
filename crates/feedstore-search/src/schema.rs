//! Index lifecycle: schema, maintenance triggers, backfill
//!
//! The whole index (FTS table, sync-state table, triggers) is derived state;
//! `disable()` followed by `enable()` plus one `update()` rebuilds it
//! identically from the primary store.

use rusqlite::Connection;

use crate::error::SearchError;

/// Create the index schema and queue all existing entries. Idempotent:
/// enabling an already-enabled index is not an error.
pub(crate) fn enable(conn: &Connection) -> Result<(), SearchError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = create_tables(conn)
        .and_then(|_| create_triggers(conn))
        .and_then(|_| backfill(conn));
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            if is_already_enabled(&err) {
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

fn is_already_enabled(err: &SearchError) -> bool {
    match err {
        SearchError::Sqlite(e) => e
            .to_string()
            .to_lowercase()
            .contains("table entries_search already exists"),
        _ => false,
    }
}

/// Drop triggers, then tables, in one transaction.
pub(crate) fn disable(conn: &Connection) -> Result<(), SearchError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = drop_triggers(conn).and_then(|_| drop_tables(conn));
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(err)
        }
    }
}

pub(crate) fn is_enabled(conn: &Connection) -> Result<bool, SearchError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (
            SELECT 1 FROM sqlite_master
            WHERE type = 'table' AND name = 'entries_search'
        )",
        [],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn create_tables(conn: &Connection) -> Result<(), SearchError> {
    // Column names matter: the first three are searchable and usable in
    // column filters; the unindexed back-pointers sit at the end so new
    // columns don't shift the searchable indexes.
    conn.execute_batch(
        "CREATE VIRTUAL TABLE entries_search USING fts5(
            title,
            content,
            feed,
            _id UNINDEXED,
            _feed UNINDEXED,
            _content_path UNINDEXED,
            _is_feed_user_title UNINDEXED,
            tokenize = \"porter unicode61 remove_diacritics 1 tokenchars '_'\"
        );",
    )?;
    conn.execute_batch(
        "INSERT INTO entries_search(entries_search, rank)
         VALUES ('rank', 'bm25(4, 1, 2)');",
    )?;

    conn.execute_batch(
        "CREATE TABLE entries_search_sync_state (
            id TEXT NOT NULL,
            feed TEXT NOT NULL,
            to_update INTEGER NOT NULL DEFAULT 1,
            to_delete INTEGER NOT NULL DEFAULT 0,
            es_rowids TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (id, feed)
        );",
    )?;
    Ok(())
}

fn backfill(conn: &Connection) -> Result<(), SearchError> {
    conn.execute_batch(
        "INSERT INTO entries_search_sync_state (id, feed)
         SELECT id, feed FROM entries;",
    )?;
    Ok(())
}

fn create_triggers(conn: &Connection) -> Result<(), SearchError> {
    // A plain insert creates the sync-state row. A REPLACE into entries is
    // a delete plus an insert at the storage layer, and the delete trigger
    // does not fire during REPLACE (recursive triggers are off), so an
    // insert may find an existing row: reset its flags but keep es_rowids,
    // the old index rows still need cleanup. The two cases need separate
    // triggers because INSERT inside a trigger body can't say OR REPLACE.
    conn.execute_batch(
        "CREATE TRIGGER entries_search_entries_insert
        AFTER INSERT ON entries

        WHEN
            NOT EXISTS (
                SELECT *
                FROM entries_search_sync_state AS esss
                WHERE (esss.id, esss.feed) = (new.id, new.feed)
            )

        BEGIN
            INSERT INTO entries_search_sync_state (id, feed)
            VALUES (new.id, new.feed);
        END;",
    )?;
    conn.execute_batch(
        "CREATE TRIGGER entries_search_entries_insert_esss_exists
        AFTER INSERT ON entries

        WHEN
            EXISTS (
                SELECT *
                FROM entries_search_sync_state AS esss
                WHERE (esss.id, esss.feed) = (new.id, new.feed)
            )

        BEGIN
            UPDATE entries_search_sync_state
            SET
                to_update = 1,
                to_delete = 0
            WHERE (new.id, new.feed) = (
                entries_search_sync_state.id,
                entries_search_sync_state.feed
            );
        END;",
    )?;
    conn.execute_batch(
        "CREATE TRIGGER entries_search_entries_update
        AFTER UPDATE

        OF title, summary, content
        ON entries
        WHEN
            new.title IS NOT old.title
            OR new.summary IS NOT old.summary
            OR new.content IS NOT old.content

        BEGIN
            UPDATE entries_search_sync_state
            SET to_update = 1
            WHERE (new.id, new.feed) = (
                entries_search_sync_state.id,
                entries_search_sync_state.feed
            );
        END;",
    )?;
    conn.execute_batch(
        "CREATE TRIGGER entries_search_entries_delete
        AFTER DELETE ON entries
        BEGIN
            UPDATE entries_search_sync_state
            SET to_delete = 1
            WHERE (old.id, old.feed) = (
                entries_search_sync_state.id,
                entries_search_sync_state.feed
            );
        END;",
    )?;

    // Nothing to do for added feeds (no entries yet) or deleted feeds (the
    // entries delete trigger covers the cascade).
    conn.execute_batch(
        "CREATE TRIGGER entries_search_feeds_update
        AFTER UPDATE

        OF title, user_title
        ON feeds
        WHEN
            new.title IS NOT old.title
            OR new.user_title IS NOT old.user_title

        BEGIN
            UPDATE entries_search_sync_state
            SET to_update = 1
            WHERE new.url = entries_search_sync_state.feed;
        END;",
    )?;

    // Pending deletions under the new URL must be flushed before sync-state
    // rows are re-pointed; if the new URL's previous feed was deleted and
    // shared entry ids with the renamed feed, re-pointing first would hit a
    // UNIQUE violation on (id, feed).
    conn.execute_batch(
        "CREATE TRIGGER entries_search_feeds_update_url
        AFTER UPDATE

        OF url ON feeds
        WHEN new.url != old.url

        BEGIN
            DELETE FROM entries_search
            WHERE rowid IN (
                SELECT value
                FROM entries_search_sync_state
                JOIN json_each(es_rowids)
                WHERE feed = new.url AND to_delete = 1
            );
            DELETE FROM entries_search_sync_state
            WHERE feed = new.url AND to_delete = 1;

            UPDATE entries_search
            SET _feed = new.url
            WHERE rowid IN (
                SELECT value
                FROM entries_search_sync_state
                JOIN json_each(es_rowids)
                WHERE feed = old.url
            );
            UPDATE entries_search_sync_state
            SET feed = new.url
            WHERE feed = old.url;

        END;",
    )?;
    Ok(())
}

fn drop_tables(conn: &Connection) -> Result<(), SearchError> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS entries_search;
         DROP TABLE IF EXISTS entries_search_sync_state;",
    )?;
    Ok(())
}

fn drop_triggers(conn: &Connection) -> Result<(), SearchError> {
    conn.execute_batch(
        "DROP TRIGGER IF EXISTS entries_search_entries_insert;
         DROP TRIGGER IF EXISTS entries_search_entries_insert_esss_exists;
         DROP TRIGGER IF EXISTS entries_search_entries_update;
         DROP TRIGGER IF EXISTS entries_search_entries_delete;
         DROP TRIGGER IF EXISTS entries_search_feeds_update;
         DROP TRIGGER IF EXISTS entries_search_feeds_update_url;",
    )?;
    Ok(())
}
