//! Ranked, filtered, paginated query execution
//!
//! An entry's multiple index rows are grouped so only its best rank orders
//! it, while every matched fragment comes back with it. Pagination is
//! keyset-based: each page query resumes strictly after the previous page's
//! last (sort key, feed, id) tuple, so concurrent index maintenance can't
//! shift or duplicate results mid-iteration.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use feedstore_core::{EntryFilter, EntrySearchCounts, EntrySearchResult, SearchSort};
use rusqlite::OptionalExtension;

use crate::error::SearchError;
use crate::result::{format_result, Marks, ResultRow, SNIPPET_TOKENS};
use crate::sql::{param_refs, push_entry_filter, SqlParams};
use crate::Search;

/// Where to resume: the sort key of the last returned row.
enum Cursor {
    Relevant {
        rank: f64,
        feed_url: String,
        entry_id: String,
    },
    Recent {
        key: String,
        feed_url: String,
        entry_id: String,
    },
}

pub(crate) fn search<'a, 's>(
    search: &'a Search<'s>,
    query: &str,
    filter: &EntryFilter,
    sort: SearchSort,
    limit: Option<usize>,
    starting_after: Option<(&str, &str)>,
) -> Result<SearchResults<'a, 's>, SearchError> {
    let cursor = match (sort, starting_after) {
        (_, None) => None,
        (SearchSort::Random, Some(_)) => {
            return Err(SearchError::InvalidCursor(
                "random order has no stable cursor".to_string(),
            ));
        }
        (SearchSort::Relevant, Some((feed_url, entry_id))) => {
            Some(search_entry_last(search, query, feed_url, entry_id)?)
        }
        (SearchSort::Recent, Some((feed_url, entry_id))) => {
            let key = search
                .storage()
                .recent_sort_key(feed_url, entry_id)?
                .ok_or_else(|| SearchError::EntryNotFound {
                    feed_url: feed_url.to_string(),
                    entry_id: entry_id.to_string(),
                })?;
            Some(Cursor::Recent {
                key,
                feed_url: feed_url.to_string(),
                entry_id: entry_id.to_string(),
            })
        }
    };

    Ok(SearchResults {
        search,
        query: query.to_string(),
        filter: filter.clone(),
        sort,
        remaining: limit,
        cursor,
        buffer: VecDeque::new(),
        exhausted: false,
    })
}

/// The best rank the given entry matches the query with; used to resume
/// relevance pagination after that entry.
fn search_entry_last(
    search: &Search<'_>,
    query: &str,
    feed_url: &str,
    entry_id: &str,
) -> Result<Cursor, SearchError> {
    let rank: Option<f64> = search
        .storage()
        .connection()
        .query_row(
            "SELECT min(rank)
             FROM entries_search
             WHERE entries_search MATCH ?1 AND _feed = ?2 AND _id = ?3
             GROUP BY _feed, _id",
            rusqlite::params![query, feed_url, entry_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(SearchError::from)?;

    match rank {
        Some(rank) => Ok(Cursor::Relevant {
            rank,
            feed_url: feed_url.to_string(),
            entry_id: entry_id.to_string(),
        }),
        None => Err(SearchError::EntryNotFound {
            feed_url: feed_url.to_string(),
            entry_id: entry_id.to_string(),
        }),
    }
}

/// Lazy, restartable sequence of search results.
///
/// Each exhausted buffer triggers one page query; a page shorter than
/// requested ends the sequence.
pub struct SearchResults<'a, 's> {
    search: &'a Search<'s>,
    query: String,
    filter: EntryFilter,
    sort: SearchSort,
    remaining: Option<usize>,
    cursor: Option<Cursor>,
    buffer: VecDeque<EntrySearchResult>,
    exhausted: bool,
}

impl Iterator for SearchResults<'_, '_> {
    type Item = Result<EntrySearchResult, SearchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        if self.buffer.is_empty() {
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        let item = self.buffer.pop_front()?;
        if let Some(remaining) = &mut self.remaining {
            *remaining -= 1;
        }
        Some(Ok(item))
    }
}

impl SearchResults<'_, '_> {
    fn fetch_page(&mut self) -> Result<(), SearchError> {
        let chunk_size = self.search.storage().chunk_size();

        // A chunk size of 0 means one unchunked page; random order is a
        // single page regardless.
        let page_size = if chunk_size == 0 {
            self.remaining
        } else {
            Some(self.remaining.map_or(chunk_size, |r| r.min(chunk_size)))
        };

        let rows = self.run_page_query(page_size)?;
        let fetched = rows.len();

        match self.sort {
            SearchSort::Random => self.exhausted = true,
            _ if chunk_size == 0 => self.exhausted = true,
            _ => {
                // a short page means the backlog is exhausted
                self.exhausted = page_size.map_or(true, |size| fetched < size);
                if let Some(last) = rows.last() {
                    self.cursor = Some(match self.sort {
                        SearchSort::Relevant => Cursor::Relevant {
                            rank: last.rank,
                            feed_url: last.feed_url.clone(),
                            entry_id: last.entry_id.clone(),
                        },
                        _ => Cursor::Recent {
                            key: last.recent_key.clone(),
                            feed_url: last.feed_url.clone(),
                            entry_id: last.entry_id.clone(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    fn run_page_query(&mut self, page_size: Option<usize>) -> Result<Vec<ResultRow>, SearchError> {
        let marks = Marks::generate();
        let mut params: SqlParams = Vec::new();

        // snippet() arguments appear three times, in select-list order:
        // title (column 0), feed (column 2), content (column 1)
        for _ in 0..3 {
            params.push(Box::new(marks.before.clone()));
            params.push(Box::new(marks.after.clone()));
            params.push(Box::new(SNIPPET_TOKENS));
        }
        params.push(Box::new(self.query.clone()));

        let mut filter_sql = String::new();
        push_entry_filter(&self.filter, &mut filter_sql, &mut params);

        let mut having = String::new();
        match &self.cursor {
            None => {}
            Some(Cursor::Relevant {
                rank,
                feed_url,
                entry_id,
            }) => {
                having.push_str(
                    "HAVING (min(search.rank), search._feed, search._id) > (?, ?, ?)",
                );
                params.push(Box::new(*rank));
                params.push(Box::new(feed_url.clone()));
                params.push(Box::new(entry_id.clone()));
            }
            Some(Cursor::Recent {
                key,
                feed_url,
                entry_id,
            }) => {
                having.push_str(
                    "HAVING search.kinda_published < ? \
                     OR (search.kinda_published = ? \
                         AND (search._feed, search._id) > (?, ?))",
                );
                params.push(Box::new(key.clone()));
                params.push(Box::new(key.clone()));
                params.push(Box::new(feed_url.clone()));
                params.push(Box::new(entry_id.clone()));
            }
        }

        let order_by = match self.sort {
            SearchSort::Relevant => "ORDER BY min(search.rank), search._feed, search._id",
            SearchSort::Recent => {
                "ORDER BY search.kinda_published DESC, search._feed, search._id"
            }
            SearchSort::Random => "ORDER BY random()",
        };

        let mut limit = String::new();
        if let Some(size) = page_size {
            limit.push_str("LIMIT ?");
            params.push(Box::new(size as i64));
        }

        let sql = format!(
            "WITH search AS (
                SELECT
                    _id,
                    _feed,
                    rank,
                    snippet(entries_search, 0, ?, ?, '...', ?) AS title,
                    snippet(entries_search, 2, ?, ?, '...', ?) AS feed,
                    _is_feed_user_title AS is_feed_user_title,
                    json_object(
                        'path', _content_path,
                        'value', snippet(entries_search, 1, ?, ?, '...', ?),
                        'rank', rank
                    ) AS content,
                    coalesce(entries.published, entries.last_updated) AS kinda_published
                FROM entries_search
                JOIN entries ON (entries.id, entries.feed) = (_id, _feed)
                WHERE entries_search MATCH ?{filter_sql}
                ORDER BY rank
                -- keeps the subquery from being flattened into the outer query
                LIMIT -1 OFFSET 0
            )
            SELECT
                search._id,
                search._feed,
                min(search.rank) AS rank,
                search.title,
                search.feed,
                search.is_feed_user_title,
                json_group_array(json(search.content)) AS content,
                search.kinda_published
            FROM search
            GROUP BY search._id, search._feed
            {having}
            {order_by}
            {limit}"
        );

        let conn = self.search.storage().connection();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(param_refs(&params).as_slice(), |row| {
                Ok(ResultRow {
                    entry_id: row.get(0)?,
                    feed_url: row.get(1)?,
                    rank: row.get(2)?,
                    title: row.get(3)?,
                    feed_title: row.get(4)?,
                    is_feed_user_title: row.get(5)?,
                    content_json: row.get(6)?,
                    recent_key: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for row in &rows {
            self.buffer.push_back(format_result(row, &marks)?);
        }
        Ok(rows)
    }
}

pub(crate) fn search_counts(
    search: &Search<'_>,
    query: &str,
    now: DateTime<Utc>,
    filter: &EntryFilter,
) -> Result<EntrySearchCounts, SearchError> {
    // days per 1, 3 and 12 months
    const PERIODS: [f64; 3] = [30.0, 91.0, 365.0];

    let mut params: SqlParams = Vec::new();
    params.push(Box::new(query.to_string()));

    let now_text = now.to_rfc3339();
    let mut window_sums = String::new();
    for days in PERIODS {
        window_sums.push_str(&format!(
            ",\n coalesce(sum(julianday(?) - julianday(\
             coalesce(entries.published, entries.last_updated)) < {}), 0)",
            days
        ));
        params.push(Box::new(now_text.clone()));
    }

    let mut filter_sql = String::new();
    push_entry_filter(filter, &mut filter_sql, &mut params);

    let sql = format!(
        "WITH search AS (
            SELECT _id, _feed
            FROM entries_search
            WHERE entries_search MATCH ?
            GROUP BY _id, _feed
        )
        SELECT
            count(*),
            coalesce(sum(entries.read = 1), 0),
            coalesce(sum(entries.important = 1), 0),
            coalesce(sum(json_array_length(coalesce(entries.enclosures, '[]')) > 0), 0)\
            {window_sums}
        FROM entries
        JOIN search ON (entries.id, entries.feed) = (search._id, search._feed)
        WHERE 1{filter_sql}"
    );

    let conn = search.storage().connection();
    let row = conn.query_row(&sql, param_refs(&params).as_slice(), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, i64>(6)?,
        ))
    })?;

    Ok(EntrySearchCounts {
        total: row.0 as u64,
        read: row.1 as u64,
        important: row.2 as u64,
        has_enclosures: row.3 as u64,
        averages: [
            row.4 as f64 / PERIODS[0],
            row.5 as f64 / PERIODS[1],
            row.6 as f64 / PERIODS[2],
        ],
    })
}
