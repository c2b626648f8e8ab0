//! Semantic column types and their SQLite storage mapping.

use serde::{Deserialize, Serialize};

/// Semantic type of an entity column.
///
/// The declared SQL spelling is what SQLite records in its catalog, so the
/// reconciler compares these strings verbatim against `PRAGMA table_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    /// Unique identifier, stored as hyphenated text
    Guid,
    /// Timestamp, stored as text in the configured format
    DateTime,
    Blob,
    /// A type with no SQLite mapping; rejected by the reconciler
    Custom(&'static str),
}

impl ColumnType {
    /// Declared SQL type, or `None` for types SQLite storage cannot express.
    ///
    /// `max_length` only affects text columns.
    pub fn sql_name(&self, max_length: Option<u32>) -> Option<String> {
        let name = match self {
            ColumnType::Text => match max_length {
                Some(len) => return Some(format!("VARCHAR({len})")),
                None => "TEXT",
            },
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Guid => "GUID",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Blob => "BLOB",
            ColumnType::Custom(_) => return None,
        };
        Some(name.to_string())
    }

    /// Check if this type is numeric.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Real)
    }

    /// Check if this type is stored as text.
    pub const fn is_text(&self) -> bool {
        matches!(
            self,
            ColumnType::Text | ColumnType::Guid | ColumnType::DateTime
        )
    }

    /// Human-readable name used in diagnostics.
    pub const fn label(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Boolean => "boolean",
            ColumnType::Guid => "guid",
            ColumnType::DateTime => "datetime",
            ColumnType::Blob => "blob",
            ColumnType::Custom(name) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_length_becomes_varchar() {
        assert_eq!(ColumnType::Text.sql_name(None).as_deref(), Some("TEXT"));
        assert_eq!(
            ColumnType::Text.sql_name(Some(80)).as_deref(),
            Some("VARCHAR(80)")
        );
        assert_eq!(
            ColumnType::Integer.sql_name(Some(80)).as_deref(),
            Some("INTEGER")
        );
    }

    #[test]
    fn custom_types_have_no_mapping() {
        assert_eq!(ColumnType::Custom("INTERVAL").sql_name(None), None);
        assert_eq!(ColumnType::Custom("INTERVAL").label(), "INTERVAL");
    }
}
