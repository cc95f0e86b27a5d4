//! Markup stripping for indexable text
//!
//! The index stores plain text only; whatever arrives (HTML fragments, plain
//! text, the occasional malformed markup) is reduced to searchable text here.
//! Pure functions, safe to run in parallel, never under a write lock.

/// Strip markup down to plain text.
///
/// Output lines are trimmed and blank lines dropped; the result is meant for
/// tokenization and snippeting, not for display layout. Input that fails to
/// parse as markup is indexed as-is.
pub fn strip_html(text: &str) -> String {
    let rendered = match html2text::from_read(text.as_bytes(), RENDER_WIDTH) {
        Ok(t) => t,
        Err(_) => text.to_string(),
    };
    normalize_whitespace(&rendered)
}

// Wide enough that prose rarely wraps; wrapping only costs cosmetic line
// breaks in snippets, not search quality.
const RENDER_WIDTH: usize = 400;

fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags() {
        let out = strip_html("<p>Hello <b>world</b></p>");
        assert!(out.contains("Hello"));
        assert!(out.contains("world"));
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(strip_html("just some text"), "just some text");
    }

    #[test]
    fn test_entities_decoded() {
        let out = strip_html("<p>fish &amp; chips</p>");
        assert!(out.contains("fish & chips"));
    }

    #[test]
    fn test_whitespace_normalized() {
        let out = strip_html("<p>one</p>\n\n\n<p>two</p>");
        assert_eq!(out, "one\ntwo");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(strip_html(""), "");
    }
}
