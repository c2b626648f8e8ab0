//! Schema snapshots.
//!
//! The target snapshot (built from entity descriptors) and the live
//! snapshot (read from the SQLite catalog) share one shape so the planner
//! can compare them field by field. Both serialize with serde; two
//! snapshots of the same database compare equal as JSON text.

use serde::{Deserialize, Serialize};
use sqlentity_core::Result;
use std::collections::BTreeMap;

// ============================================================================
// Snapshot Types
// ============================================================================

/// Every table of a database, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: BTreeMap<String, TableSnapshot>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a table, ignoring ASCII case.
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name).or_else(|| {
            self.tables
                .values()
                .find(|t| t.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn insert(&mut self, table: TableSnapshot) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Pretty JSON rendering, stable across runs.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One table: columns in physical order, constraints sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<ColumnSnapshot>,
    pub foreign_keys: Vec<ForeignKeySnapshot>,
    pub unique_constraints: Vec<UniqueSnapshot>,
    pub indexes: Vec<IndexSnapshot>,
}

impl TableSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Get a column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnSnapshot> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The foreign key declared on `column`, if any.
    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeySnapshot> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.column.eq_ignore_ascii_case(column))
    }

    /// Sort constraint lists so equal schemas produce equal snapshots.
    pub fn normalize(&mut self) {
        self.foreign_keys.sort_by(|a, b| a.column.cmp(&b.column));
        self.unique_constraints
            .sort_by(|a, b| a.name.cmp(&b.name).then(a.columns.cmp(&b.columns)));
        self.indexes.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// A physical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub name: String,
    /// Declared type, upper-cased (`TEXT`, `VARCHAR(80)`, `BOOLEAN`, ...)
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnSnapshot {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into().to_ascii_uppercase(),
            nullable,
            primary_key: false,
        }
    }

    /// Type names compare without case or inner whitespace.
    pub fn same_type(&self, other: &ColumnSnapshot) -> bool {
        normalize_sql_type(&self.sql_type) == normalize_sql_type(&other.sql_type)
    }

    /// Both sides are text and differ at most in declared length. SQLite
    /// does not enforce `VARCHAR(n)`, so stored values survive either way.
    pub fn is_text_resize(&self, other: &ColumnSnapshot) -> bool {
        is_text_type(&self.sql_type) && is_text_type(&other.sql_type)
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySnapshot {
    /// Constraint name, when the table declared one
    pub name: Option<String>,
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
    /// ON DELETE action in SQL spelling
    pub on_delete: String,
}

impl ForeignKeySnapshot {
    /// Same reference, ignoring the constraint name.
    pub fn same_reference(&self, other: &ForeignKeySnapshot) -> bool {
        self.column.eq_ignore_ascii_case(&other.column)
            && self.foreign_table.eq_ignore_ascii_case(&other.foreign_table)
            && self.foreign_column.eq_ignore_ascii_case(&other.foreign_column)
            && self.on_delete.eq_ignore_ascii_case(&other.on_delete)
    }
}

/// A UNIQUE table constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueSnapshot {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// A plain index created with `CREATE INDEX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub name: String,
    pub columns: Vec<String>,
}

/// Canonical spelling of a declared SQL type.
fn is_text_type(sql_type: &str) -> bool {
    let normalized = normalize_sql_type(sql_type);
    matches!(
        normalized.split('(').next(),
        Some("TEXT" | "VARCHAR" | "NVARCHAR")
    )
}

pub fn normalize_sql_type(sql_type: &str) -> String {
    sql_type
        .split_whitespace()
        .collect::<String>()
        .to_ascii_uppercase()
}

// ============================================================================
// Unit Tests
// ============================================================================
