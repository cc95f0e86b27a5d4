//! Highlighted snippet strings
//!
//! The search index marks matched terms with a pair of per-query delimiter
//! strings; `HighlightedString::extract` turns such marked text back into the
//! plain value plus the byte ranges that were highlighted.

use std::fmt;
use std::ops::Range;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HighlightError {
    #[error("unbalanced highlight marker in {0:?}")]
    Unbalanced(String),
}

/// A string with zero or more highlighted slices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightedString {
    value: String,
    highlights: Vec<Range<usize>>,
}

impl HighlightedString {
    /// Parse `input`, treating `before`/`after` as highlight delimiters.
    ///
    /// Markers must be balanced and non-nested; the search index generates
    /// them per query, so a violation means the marked text was corrupted.
    pub fn extract(input: &str, before: &str, after: &str) -> Result<Self, HighlightError> {
        let mut value = String::new();
        let mut highlights = Vec::new();
        let mut open: Option<usize> = None;
        let mut rest = input;

        loop {
            let next_before = rest.find(before);
            let next_after = rest.find(after);
            let (pos, is_before) = match (next_before, next_after) {
                (None, None) => break,
                (Some(b), None) => (b, true),
                (None, Some(a)) => (a, false),
                (Some(b), Some(a)) => {
                    if b < a {
                        (b, true)
                    } else {
                        (a, false)
                    }
                }
            };

            value.push_str(&rest[..pos]);
            if is_before {
                if open.is_some() {
                    return Err(HighlightError::Unbalanced(input.to_string()));
                }
                open = Some(value.len());
                rest = &rest[pos + before.len()..];
            } else {
                let start = match open.take() {
                    Some(start) => start,
                    None => return Err(HighlightError::Unbalanced(input.to_string())),
                };
                highlights.push(start..value.len());
                rest = &rest[pos + after.len()..];
            }
        }

        if open.is_some() {
            return Err(HighlightError::Unbalanced(input.to_string()));
        }
        value.push_str(rest);

        Ok(HighlightedString { value, highlights })
    }

    /// A string with no highlights.
    pub fn plain(value: impl Into<String>) -> Self {
        HighlightedString {
            value: value.into(),
            highlights: Vec::new(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn highlights(&self) -> &[Range<usize>] {
        &self.highlights
    }

    /// The highlighted slices themselves.
    pub fn highlighted_slices(&self) -> impl Iterator<Item = &str> {
        self.highlights.iter().map(|r| &self.value[r.clone()])
    }

    /// Re-insert delimiters around the highlighted slices.
    pub fn apply(&self, before: &str, after: &str) -> String {
        let mut out = String::with_capacity(self.value.len());
        let mut pos = 0;
        for range in &self.highlights {
            out.push_str(&self.value[pos..range.start]);
            out.push_str(before);
            out.push_str(&self.value[range.clone()]);
            out.push_str(after);
            pos = range.end;
        }
        out.push_str(&self.value[pos..]);
        out
    }
}

impl fmt::Display for HighlightedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
