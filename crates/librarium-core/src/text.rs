//! Pure string utilities: slug derivation, id sanitization, excerpts.

/// Maximum slug length in characters.
const MAX_SLUG_LEN: usize = 40;

/// Derive a directory-name slug from a query.
///
/// Lowercases, drops every character outside `[a-z0-9\s-]`, collapses
/// whitespace to `-`, collapses runs of `-`, trims leading/trailing `-`,
/// and truncates to 40 characters.
#[must_use]
pub fn slugify(query: &str) -> String {
    let lowered = query.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut last_dash = true; // suppress leading dashes
    for ch in lowered.chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' => Some(ch),
            c if c.is_whitespace() => Some('-'),
            '-' => Some('-'),
            _ => None,
        };
        match mapped {
            Some('-') => {
                if !last_dash {
                    slug.push('-');
                    last_dash = true;
                }
            }
            Some(c) => {
                slug.push(c);
                last_dash = false;
            }
            None => {}
        }
    }
    let truncated: String = slug.chars().take(MAX_SLUG_LEN).collect();
    truncated.trim_matches('-').to_string()
}

/// Replace any character outside `[A-Za-z0-9._-]` with `_`.
///
/// Used to turn provider ids into artifact file names.
#[must_use]
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

/// Whitespace-delimited word count.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Truncate a string to at most `max_bytes` bytes at a char boundary.
#[must_use]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Short single-line excerpt of a response body for error messages.
///
/// Collapses newlines and truncates to `max_bytes` with an ellipsis.
#[must_use]
pub fn excerpt(body: &str, max_bytes: usize) -> String {
    let flattened = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.len() <= max_bytes {
        return flattened;
    }
    format!("{}…", truncate_str(&flattened, max_bytes))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_from_punctuated_query() {
        assert_eq!(
            slugify("PostgreSQL: Connection pooling!!"),
            "postgresql-connection-pooling"
        );
    }

    #[test]
    fn slug_collapses_whitespace_and_dashes() {
        assert_eq!(slugify("a   b -- c"), "a-b-c");
        assert_eq!(slugify("  leading and trailing  "), "leading-and-trailing");
    }

    #[test]
    fn slug_truncates_to_forty_chars() {
        let long = "word ".repeat(20);
        let slug = slugify(&long);
        assert!(slug.chars().count() <= 40);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn slug_of_symbols_is_empty() {
        assert_eq!(slugify("!!! ??? ***"), "");
    }

    #[test]
    fn slug_keeps_unicode_out() {
        assert_eq!(slugify("caché résumé"), "cach-rsum");
    }

    #[test]
    fn sanitize_id_passthrough() {
        assert_eq!(sanitize_id("perplexity-sonar-pro"), "perplexity-sonar-pro");
        assert_eq!(sanitize_id("my_provider.v2"), "my_provider.v2");
    }

    #[test]
    fn sanitize_id_replaces_unsafe_chars() {
        assert_eq!(sanitize_id("my provider/1"), "my_provider_1");
        assert_eq!(sanitize_id("a:b*c"), "a_b_c");
    }

    #[test]
    fn word_count_basic() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("one"), 1);
        assert_eq!(word_count("  two   words \n"), 2);
    }

    #[test]
    fn excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("short body", 200), "short body");
        assert_eq!(excerpt("line\none\nline two", 200), "line one line two");
        let long = "x".repeat(300);
        let e = excerpt(&long, 200);
        assert!(e.len() <= 204); // 200 bytes + ellipsis
        assert!(e.ends_with('…'));
    }

    #[test]
    fn truncate_str_respects_char_boundaries() {
        assert_eq!(truncate_str("hello", 3), "hel");
        assert_eq!(truncate_str("ab—cd", 3), "ab");
        assert_eq!(truncate_str("ab—cd", 5), "ab—");
    }
}
