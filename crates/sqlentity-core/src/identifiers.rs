//! SQL identifier quoting and validation.
//!
//! Table and column names end up unquoted inside compiled predicates
//! (`a.Age > @Age0`), so every name is validated once at registration
//! time. DDL still quotes everything.

use regex::Regex;
use std::sync::OnceLock;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|e| {
            unreachable!("identifier pattern is a valid regex: {e}")
        })
    })
}

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them.
///
/// ```
/// use sqlentity_core::quote_ident;
///
/// assert_eq!(quote_ident("Blog"), "\"Blog\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check that a name can be used unquoted as a table, column or alias.
pub fn is_valid_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

/// Quote a string literal for inlining into SQL.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
