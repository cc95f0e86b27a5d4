//! Incremental index maintenance
//!
//! `update()` drains the sync-state backlog in two passes: deletions first,
//! then inserts/updates. Both work in bounded chunks, one immediate-lock
//! transaction per chunk (deletions) or per entry (inserts), so a write lock
//! is never held across HTML stripping and a crash at any point leaves the
//! flags describing exactly the remaining work.

use rusqlite::{params, Connection, OptionalExtension};

use feedstore_core::EntryContent;
use feedstore_storage::Storage;

use crate::error::SearchError;
use crate::html::strip_html;

/// What one `update()` pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Entries whose stale index rows were removed.
    pub deleted: usize,
    /// Entries (re)indexed.
    pub indexed: usize,
    /// Entries skipped because a concurrent writer got there first; they
    /// are either done or queued for the next pass.
    pub skipped: usize,
}

pub(crate) fn update(storage: &Storage) -> Result<UpdateStats, SearchError> {
    let mut stats = UpdateStats::default();
    while delete_one_chunk(storage, &mut stats)? {}
    while insert_one_chunk(storage, &mut stats)? {}
    Ok(stats)
}

/// Drain one chunk of `to_delete` rows. Returns whether a full chunk was
/// processed; a short chunk means the backlog is drained (at least when
/// nothing runs in parallel, which is good enough, the next call catches
/// stragglers).
fn delete_one_chunk(storage: &Storage, stats: &mut UpdateStats) -> Result<bool, SearchError> {
    // an unchunked configuration still deletes one by one, never unbounded
    let chunk_size = storage.chunk_size().max(1);
    let conn = storage.connection();

    // Immediate, not deferred: this transaction starts reading but always
    // writes, and upgrading a read lock mid-transaction deadlocks against
    // concurrent writers.
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = delete_chunk_body(conn, chunk_size, stats);
    match result {
        Ok(more) => {
            conn.execute_batch("COMMIT")?;
            Ok(more)
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(err)
        }
    }
}

fn delete_chunk_body(
    conn: &Connection,
    chunk_size: usize,
    stats: &mut UpdateStats,
) -> Result<bool, SearchError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, feed, es_rowids
         FROM entries_search_sync_state
         WHERE to_delete
         LIMIT ?1",
    )?;
    let rows: Vec<(String, String, String)> = stmt
        .query_map([chunk_size as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<rusqlite::Result<_>>()?;

    if rows.is_empty() {
        return Ok(false);
    }
    tracing::debug!(
        chunk_size,
        rows = rows.len(),
        first = ?(&rows[0].1, &rows[0].0),
        "deleting index rows"
    );

    let mut delete_row = conn.prepare_cached("DELETE FROM entries_search WHERE rowid = ?1")?;
    let mut delete_state = conn.prepare_cached(
        "DELETE FROM entries_search_sync_state WHERE (id, feed) = (?1, ?2)",
    )?;
    for (id, feed, es_rowids) in &rows {
        for rowid in parse_rowids(es_rowids)? {
            delete_row.execute([rowid])?;
        }
        delete_state.execute(params![id, feed])?;
        stats.deleted += 1;
    }

    Ok(rows.len() == chunk_size)
}

/// One entry's worth of pending work, snapshotted during the read phase.
struct PendingEntry {
    id: String,
    feed_url: String,
    last_updated: String,
    es_rowids: Vec<i64>,
    feed_title: Option<String>,
    is_feed_user_title: bool,
    title: Option<String>,
    summary: Option<String>,
    content: Option<String>,
}

/// The same entry after normalization, ready to write.
struct NormalizedEntry {
    id: String,
    feed_url: String,
    last_updated: String,
    old_rowids: Vec<i64>,
    title: Option<String>,
    feed_title: Option<String>,
    is_feed_user_title: bool,
    fragments: Vec<Fragment>,
}

struct Fragment {
    value: Option<String>,
    path: Option<String>,
}

/// Process one chunk of `to_update` rows.
///
/// Three phases: snapshot the pending entries (plain read), strip markup
/// with no lock held, then one immediate transaction per entry that
/// re-checks the snapshot before writing. An entry modified in between is
/// skipped; whoever modified it re-queued it, so nothing is lost.
fn insert_one_chunk(storage: &Storage, stats: &mut UpdateStats) -> Result<bool, SearchError> {
    let chunk_size = storage.chunk_size().max(1);
    let conn = storage.connection();

    let pending = read_pending(conn, chunk_size)?;
    if pending.is_empty() {
        return Ok(false);
    }
    tracing::debug!(
        chunk_size,
        rows = pending.len(),
        first = ?(&pending[0].feed_url, &pending[0].id),
        "indexing entries"
    );
    let processed = pending.len();

    let normalized: Vec<NormalizedEntry> = pending
        .into_iter()
        .map(normalize_entry)
        .collect::<Result<_, _>>()?;

    for entry in &normalized {
        if commit_entry(conn, entry)? {
            stats.indexed += 1;
        } else {
            tracing::debug!(
                feed = %entry.feed_url,
                id = %entry.id,
                "entry changed concurrently, skipping"
            );
            stats.skipped += 1;
        }
    }

    Ok(processed == chunk_size)
}

fn read_pending(conn: &Connection, chunk_size: usize) -> Result<Vec<PendingEntry>, SearchError> {
    let mut stmt = conn.prepare_cached(
        "SELECT
            entries.id,
            entries.feed,
            entries.last_updated,
            esss.es_rowids,
            coalesce(feeds.user_title, feeds.title),
            feeds.user_title IS NOT NULL,
            entries.title,
            entries.summary,
            entries.content
        FROM entries_search_sync_state AS esss
        JOIN entries ON (entries.id, entries.feed) = (esss.id, esss.feed)
        JOIN feeds ON feeds.url = esss.feed
        WHERE esss.to_update
        LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([chunk_size as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(
            |(id, feed_url, last_updated, es_rowids, feed_title, is_user, title, summary, content)| {
                Ok(PendingEntry {
                    id,
                    feed_url,
                    last_updated,
                    es_rowids: parse_rowids(&es_rowids)?,
                    feed_title,
                    is_feed_user_title: is_user,
                    title,
                    summary,
                    content,
                })
            },
        )
        .collect()
}

/// Build the ordered fragment list for one entry and strip markup from every
/// text field. Pure; no database access.
fn normalize_entry(entry: PendingEntry) -> Result<NormalizedEntry, SearchError> {
    let mut fragments = Vec::new();

    if let Some(content_json) = &entry.content {
        let items: Vec<EntryContent> = serde_json::from_str(content_json)?;
        for (i, item) in items.iter().enumerate() {
            if !item.is_searchable() {
                continue;
            }
            fragments.push(Fragment {
                value: Some(strip_html(&item.value)),
                path: Some(format!(".content[{}].value", i)),
            });
        }
    }

    if let Some(summary) = &entry.summary {
        if !summary.is_empty() {
            fragments.push(Fragment {
                value: Some(strip_html(summary)),
                path: Some(".summary".to_string()),
            });
        }
    }

    // no indexable text at all: one null fragment keeps the entry findable
    // by title and feed title
    if fragments.is_empty() {
        fragments.push(Fragment {
            value: None,
            path: None,
        });
    }

    Ok(NormalizedEntry {
        title: entry.title.as_deref().map(strip_html),
        feed_title: entry.feed_title.as_deref().map(strip_html),
        id: entry.id,
        feed_url: entry.feed_url,
        last_updated: entry.last_updated,
        old_rowids: entry.es_rowids,
        is_feed_user_title: entry.is_feed_user_title,
        fragments,
    })
}

/// Write one normalized entry, but only if the snapshot still holds.
/// Returns whether the entry was written.
fn commit_entry(conn: &Connection, entry: &NormalizedEntry) -> Result<bool, SearchError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = commit_entry_body(conn, entry);
    match result {
        Ok(written) => {
            conn.execute_batch("COMMIT")?;
            Ok(written)
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(err)
        }
    }
}

fn commit_entry_body(conn: &Connection, entry: &NormalizedEntry) -> Result<bool, SearchError> {
    // Recheck 1: still queued, and the recorded index rows are the ones we
    // snapshotted. A mismatch means a concurrent update() already handled
    // this entry.
    let state: Option<(bool, String)> = conn
        .query_row(
            "SELECT to_update, es_rowids
             FROM entries_search_sync_state
             WHERE (id, feed) = (?1, ?2)",
            params![entry.id, entry.feed_url],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((to_update, es_rowids_json)) = state else {
        return Ok(false);
    };
    if !to_update || !same_rowid_set(&parse_rowids(&es_rowids_json)?, &entry.old_rowids) {
        return Ok(false);
    }

    // Recheck 2: the entry itself didn't change since the read phase. If it
    // did, leave to_update set; the next pass picks it up with fresh data.
    let last_updated: Option<String> = conn
        .query_row(
            "SELECT last_updated FROM entries WHERE (id, feed) = (?1, ?2)",
            params![entry.id, entry.feed_url],
            |row| row.get(0),
        )
        .optional()?;
    if last_updated.as_deref() != Some(entry.last_updated.as_str()) {
        return Ok(false);
    }

    // The deletion pass can't be relied on for these: a parallel update may
    // have inserted rows since our snapshot, and stale rows would duplicate.
    let mut delete_row = conn.prepare_cached("DELETE FROM entries_search WHERE rowid = ?1")?;
    for rowid in &entry.old_rowids {
        delete_row.execute([rowid])?;
    }

    let mut new_rowids: Vec<i64> = Vec::with_capacity(entry.fragments.len());
    {
        let mut insert = conn.prepare_cached(
            "INSERT INTO entries_search
             (title, content, feed, _id, _feed, _content_path, _is_feed_user_title)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for fragment in &entry.fragments {
            insert.execute(params![
                entry.title,
                fragment.value,
                entry.feed_title,
                entry.id,
                entry.feed_url,
                fragment.path,
                entry.is_feed_user_title,
            ])?;
            new_rowids.push(conn.last_insert_rowid());
        }
    }

    conn.execute(
        "UPDATE entries_search_sync_state
         SET to_update = 0, es_rowids = ?1
         WHERE (id, feed) = (?2, ?3)",
        params![serde_json::to_string(&new_rowids)?, entry.id, entry.feed_url],
    )?;

    Ok(true)
}

fn parse_rowids(json: &str) -> Result<Vec<i64>, SearchError> {
    Ok(serde_json::from_str(json)?)
}

fn same_rowid_set(a: &[i64], b: &[i64]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use feedstore_core::Entry;

    fn make_storage(chunk_size: usize) -> Storage {
        let storage = Storage::open_in_memory()
            .unwrap()
            .with_chunk_size(chunk_size);
        storage.add_feed("http://a.example/feed", Some("Feed A")).unwrap();
        crate::schema::enable(storage.connection()).unwrap();
        storage
    }

    fn ts(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn index_rows(storage: &Storage, id: &str) -> Vec<(i64, Option<String>, Option<String>)> {
        let mut stmt = storage
            .connection()
            .prepare("SELECT rowid, content, _content_path FROM entries_search WHERE _id = ?1 ORDER BY rowid")
            .unwrap();
        stmt.query_map([id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }

    fn recorded_rowids(storage: &Storage, id: &str) -> Vec<i64> {
        let json: String = storage
            .connection()
            .query_row(
                "SELECT es_rowids FROM entries_search_sync_state WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_index_entry_with_content_and_summary() {
        let storage = make_storage(64);
        let entry = Entry::new("http://a.example/feed", "one", ts(0))
            .with_title("The Title")
            .with_summary("A summary")
            .with_content(vec![
                EntryContent::new("<p>first body</p>").with_mime_type("text/html"),
                EntryContent::new("binary").with_mime_type("application/pdf"),
            ]);
        storage.add_or_replace_entry(&entry).unwrap();

        let stats = update(&storage).unwrap();
        assert_eq!(stats.indexed, 1);

        // one row for the html item, one for the summary; the pdf item is
        // skipped
        let rows = index_rows(&storage, "one");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].2.as_deref(), Some(".content[0].value"));
        assert_eq!(rows[1].2.as_deref(), Some(".summary"));
        assert_eq!(rows[0].1.as_deref(), Some("first body"));

        let mut recorded = recorded_rowids(&storage, "one");
        recorded.sort_unstable();
        let mut actual: Vec<i64> = index_rows(&storage, "one").iter().map(|r| r.0).collect();
        actual.sort_unstable();
        assert_eq!(recorded, actual);
    }

    #[test]
    fn test_entry_without_text_gets_null_fragment() {
        let storage = make_storage(64);
        let entry = Entry::new("http://a.example/feed", "bare", ts(0)).with_title("Only Title");
        storage.add_or_replace_entry(&entry).unwrap();

        update(&storage).unwrap();

        let rows = index_rows(&storage, "bare");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, None);
        assert_eq!(rows[0].2, None);
    }

    #[test]
    fn test_reindex_replaces_old_rows() {
        let storage = make_storage(64);
        let entry = Entry::new("http://a.example/feed", "one", ts(0)).with_summary("old words");
        storage.add_or_replace_entry(&entry).unwrap();
        update(&storage).unwrap();
        let before: Vec<i64> = index_rows(&storage, "one").iter().map(|r| r.0).collect();

        let entry = Entry::new("http://a.example/feed", "one", ts(10)).with_summary("new words");
        storage.add_or_replace_entry(&entry).unwrap();
        let stats = update(&storage).unwrap();
        assert_eq!(stats.indexed, 1);

        let rows = index_rows(&storage, "one");
        assert_eq!(rows.len(), 1);
        assert!(!before.contains(&rows[0].0) || rows[0].1.as_deref() == Some("new words"));
        assert_eq!(rows[0].1.as_deref(), Some("new words"));
    }

    #[test]
    fn test_delete_pass_removes_rows_and_state() {
        let storage = make_storage(64);
        let entry = Entry::new("http://a.example/feed", "one", ts(0)).with_summary("words");
        storage.add_or_replace_entry(&entry).unwrap();
        update(&storage).unwrap();

        storage.delete_entry("http://a.example/feed", "one").unwrap();
        let stats = update(&storage).unwrap();
        assert_eq!(stats.deleted, 1);

        assert!(index_rows(&storage, "one").is_empty());
        let states: i64 = storage
            .connection()
            .query_row("SELECT COUNT(*) FROM entries_search_sync_state", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(states, 0);
    }

    #[test]
    fn test_chunk_sizes_converge_identically() {
        let snapshot = |storage: &Storage| -> Vec<(String, Option<String>, Option<String>)> {
            let mut stmt = storage
                .connection()
                .prepare(
                    "SELECT _id, _content_path, content FROM entries_search
                     ORDER BY _id, coalesce(_content_path, '')",
                )
                .unwrap();
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                .unwrap()
                .collect::<rusqlite::Result<_>>()
                .unwrap()
        };

        let mut snapshots = Vec::new();
        for chunk_size in [0, 1, 1000] {
            let storage = make_storage(chunk_size);
            for i in 0..5 {
                let entry = Entry::new("http://a.example/feed", format!("e{}", i), ts(i))
                    .with_title(format!("title {}", i))
                    .with_summary(format!("summary {}", i));
                storage.add_or_replace_entry(&entry).unwrap();
            }
            storage.delete_entry("http://a.example/feed", "e3").unwrap();
            update(&storage).unwrap();
            snapshots.push(snapshot(&storage));
        }

        assert_eq!(snapshots[0], snapshots[1]);
        assert_eq!(snapshots[1], snapshots[2]);
    }

    #[test]
    fn test_stale_snapshot_is_skipped() {
        let storage = make_storage(64);
        let entry = Entry::new("http://a.example/feed", "one", ts(0)).with_summary("v1");
        storage.add_or_replace_entry(&entry).unwrap();

        // snapshot, then change the entry before the write phase
        let pending = read_pending(storage.connection(), 64).unwrap();
        assert_eq!(pending.len(), 1);
        let normalized: Vec<NormalizedEntry> =
            pending.into_iter().map(normalize_entry).collect::<Result<_, _>>().unwrap();

        let entry = Entry::new("http://a.example/feed", "one", ts(10)).with_summary("v2");
        storage.add_or_replace_entry(&entry).unwrap();

        let written = commit_entry(storage.connection(), &normalized[0]).unwrap();
        assert!(!written);

        // still queued; the next full pass indexes the new version
        let stats = update(&storage).unwrap();
        assert_eq!(stats.indexed, 1);
        let rows = index_rows(&storage, "one");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.as_deref(), Some("v2"));
    }

    #[test]
    fn test_mismatched_rowids_are_skipped() {
        let storage = make_storage(64);
        let entry = Entry::new("http://a.example/feed", "one", ts(0)).with_summary("words");
        storage.add_or_replace_entry(&entry).unwrap();

        let pending = read_pending(storage.connection(), 64).unwrap();
        let normalized: Vec<NormalizedEntry> =
            pending.into_iter().map(normalize_entry).collect::<Result<_, _>>().unwrap();

        // a concurrent update() finished this entry in the meantime
        update(&storage).unwrap();

        let written = commit_entry(storage.connection(), &normalized[0]).unwrap();
        assert!(!written);

        // exactly one copy of the entry's rows remains
        assert_eq!(index_rows(&storage, "one").len(), 1);
    }

    #[test]
    fn test_update_on_empty_backlog_is_noop() {
        let storage = make_storage(64);
        let stats = update(&storage).unwrap();
        assert_eq!(stats, UpdateStats::default());
    }
}
