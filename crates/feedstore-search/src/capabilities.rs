//! Storage engine capability checks
//!
//! `last_insert_rowid()` is only reliable for FTS5 tables starting with
//! SQLite 3.18, and the sync state serialization plus one maintenance
//! trigger need the JSON1 functions. Checked lazily by `update()` rather
//! than `enable()`, so enabling works against an unvalidated engine.

use rusqlite::Connection;

use crate::error::SearchError;

const MINIMUM_SQLITE_VERSION: (u32, u32) = (3, 18);

const REQUIRED_FUNCTIONS: &[&str] = &["json", "json_object", "json_group_array", "json_each"];

pub(crate) fn check(conn: &Connection) -> Result<(), SearchError> {
    let version: String = conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let actual = (parts.next().unwrap_or(0), parts.next().unwrap_or(0));
    if actual < MINIMUM_SQLITE_VERSION {
        return Err(SearchError::Capability(format!(
            "SQLite version {} is older than the required {}.{}",
            version, MINIMUM_SQLITE_VERSION.0, MINIMUM_SQLITE_VERSION.1
        )));
    }

    for name in REQUIRED_FUNCTIONS {
        let present: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM pragma_function_list WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        if !present {
            return Err(SearchError::Capability(format!(
                "required SQLite function missing: {}",
                name
            )));
        }
    }

    Ok(())
}
