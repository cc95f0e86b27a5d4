//! Filter compilation
//!
//! Filters arrive as the typed `EntryFilter` tree and are compiled here into
//! SQL clauses plus a positional parameter list. Caller-provided values only
//! ever travel as bound parameters; the generated text contains column names
//! and constants exclusively, which also makes the query shape testable
//! without touching the engine.

use feedstore_core::{EntryFilter, TristateFilter};
use rusqlite::ToSql;

pub(crate) type SqlParams = Vec<Box<dyn ToSql>>;

/// Borrow an owned parameter list the way rusqlite wants it.
pub(crate) fn param_refs(params: &SqlParams) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

/// Append ` AND ...` clauses for `filter` against the joined `entries` table.
pub(crate) fn push_entry_filter(filter: &EntryFilter, sql: &mut String, params: &mut SqlParams) {
    if let Some(feed_url) = &filter.feed_url {
        sql.push_str(" AND entries.feed = ?");
        params.push(Box::new(feed_url.clone()));
    }

    if let Some(clause) = tristate_clause("entries.read", filter.read) {
        sql.push_str(" AND ");
        sql.push_str(&clause);
    }
    if let Some(clause) = tristate_clause("entries.important", filter.important) {
        sql.push_str(" AND ");
        sql.push_str(&clause);
    }

    match filter.has_enclosures {
        Some(true) => {
            sql.push_str(" AND json_array_length(coalesce(entries.enclosures, '[]')) > 0")
        }
        Some(false) => {
            sql.push_str(" AND json_array_length(coalesce(entries.enclosures, '[]')) = 0")
        }
        None => {}
    }

    for group in &filter.feed_tags {
        let terms: Vec<String> = group
            .iter()
            .map(|term| {
                params.push(Box::new(term.tag.clone()));
                let exists = "EXISTS (SELECT 1 FROM feed_tags \
                     WHERE feed_tags.feed = entries.feed AND feed_tags.tag = ?)";
                if term.negated {
                    format!("NOT {}", exists)
                } else {
                    exists.to_string()
                }
            })
            .collect();
        sql.push_str(" AND (");
        sql.push_str(&terms.join(" OR "));
        sql.push(')');
    }
}

/// The SQL predicate for one tristate filter over a nullable boolean column.
pub(crate) fn tristate_clause(column: &str, filter: TristateFilter) -> Option<String> {
    match filter {
        TristateFilter::Any => None,
        TristateFilter::IsTrue => Some(format!("{} = 1", column)),
        TristateFilter::IsFalse => Some(format!("{} = 0", column)),
        TristateFilter::NotSet => Some(format!("{} IS NULL", column)),
        TristateFilter::NotTrue => Some(format!("coalesce({}, 0) = 0", column)),
        TristateFilter::NotFalse => Some(format!("coalesce({}, 1) = 1", column)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedstore_core::TagTerm;

    fn compile(filter: &EntryFilter) -> (String, usize) {
        let mut sql = String::new();
        let mut params = SqlParams::new();
        push_entry_filter(filter, &mut sql, &mut params);
        (sql, params.len())
    }

    #[test]
    fn test_empty_filter_compiles_to_nothing() {
        let (sql, params) = compile(&EntryFilter::new());
        assert_eq!(sql, "");
        assert_eq!(params, 0);
    }

    #[test]
    fn test_feed_filter_binds_url() {
        let (sql, params) = compile(&EntryFilter::new().with_feed("http://a.example/"));
        assert_eq!(sql, " AND entries.feed = ?");
        assert_eq!(params, 1);
    }

    #[test]
    fn test_tristate_clauses() {
        assert_eq!(tristate_clause("c", TristateFilter::Any), None);
        assert_eq!(tristate_clause("c", TristateFilter::IsTrue).unwrap(), "c = 1");
        assert_eq!(tristate_clause("c", TristateFilter::IsFalse).unwrap(), "c = 0");
        assert_eq!(tristate_clause("c", TristateFilter::NotSet).unwrap(), "c IS NULL");
        assert_eq!(
            tristate_clause("c", TristateFilter::NotTrue).unwrap(),
            "coalesce(c, 0) = 0"
        );
        assert_eq!(
            tristate_clause("c", TristateFilter::NotFalse).unwrap(),
            "coalesce(c, 1) = 1"
        );
    }

    #[test]
    fn test_tag_groups_are_anded_terms_ored() {
        let filter = EntryFilter::new()
            .with_tag_group(vec![TagTerm::new("a"), TagTerm::negated("b")])
            .with_tag_group(vec![TagTerm::new("c")]);
        let (sql, params) = compile(&filter);

        assert_eq!(params, 3);
        assert_eq!(sql.matches(" AND (").count(), 2);
        assert_eq!(sql.matches(" OR ").count(), 1);
        assert_eq!(sql.matches("NOT EXISTS").count(), 1);
        assert_eq!(sql.matches("EXISTS").count(), 3);
    }

    #[test]
    fn test_no_caller_values_in_sql_text() {
        let filter = EntryFilter::new()
            .with_feed("http://evil.example/'; DROP TABLE entries; --")
            .with_tag_group(vec![TagTerm::new("'quoted'")]);
        let (sql, _) = compile(&filter);
        assert!(!sql.contains("evil.example"));
        assert!(!sql.contains("quoted"));
    }
}
