//! Query normalization.
//!
//! Structurally identical queries map to one string: literals and parameter
//! placeholders become `?`, whitespace collapses, case folds.

use once_cell::sync::Lazy;
use regex::Regex;

/// Single-quoted string literal, with `''` escapes.
static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").unwrap());

/// `$1`, `?`.
static POSITIONAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d+|\?").unwrap());

/// `:name` (not a `::type` cast) and `@name`.
static NAMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^:]):[A-Za-z_]\w*|@[A-Za-z_]\w*").unwrap());

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn normalize_query(query: &str) -> String {
    let query = STRING_LITERAL.replace_all(query, "?");
    let query = POSITIONAL.replace_all(&query, "?");
    let query = NAMED.replace_all(&query, |caps: &regex::Captures<'_>| {
        // Keep the character consumed in front of a `:name`.
        format!("{}?", caps.get(1).map_or("", |m| m.as_str()))
    });
    let query = NUMBER.replace_all(&query, "?");
    let query = WHITESPACE.replace_all(query.trim(), " ");
    query.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace_fold() {
        assert_eq!(
            normalize_query("  SELECT *\n\tFROM   Users  "),
            "select * from users"
        );
    }

    #[test]
    fn test_placeholders_and_literals_become_wildcards() {
        let expected = "select * from users where id = ? and name = ?";
        assert_eq!(
            normalize_query("SELECT * FROM users WHERE id = $1 AND name = $2"),
            expected
        );
        assert_eq!(
            normalize_query("select * from users where id = 42 and name = 'O''Brien'"),
            expected
        );
        assert_eq!(
            normalize_query("select * from users where id = :id and name = @name"),
            expected
        );
    }

    #[test]
    fn test_casts_and_identifiers_survive() {
        assert_eq!(
            normalize_query("SELECT created_at::text FROM t1 WHERE v = 1.5"),
            "select created_at::text from t1 where v = ?"
        );
    }
}
