//! Field and column definitions.

use crate::types::ColumnType;
use serde::{Deserialize, Serialize};

/// Name of the implicit surrogate primary key carried by every table.
pub const PRIMARY_KEY: &str = "Id";

/// Name of the implicit activation flag carried by every table.
///
/// Soft-delete entities clear it instead of deleting the row.
pub const ACTIVE_FLAG: &str = "IsActive";

/// Referential action for foreign key constraints (ON DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// Raise an error if any references exist.
    #[default]
    NoAction,
    /// Same as NO ACTION but checked immediately.
    Restrict,
    /// Delete referencing rows.
    Cascade,
    /// Set referencing columns to NULL.
    SetNull,
    /// Set referencing columns to their default values.
    SetDefault,
}

impl ReferentialAction {
    /// Get the SQL representation of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse a referential action as reported by `PRAGMA foreign_key_list`.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NO ACTION" | "NOACTION" | "NO_ACTION" => Some(ReferentialAction::NoAction),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" | "SETNULL" | "SET_NULL" => Some(ReferentialAction::SetNull),
            "SET DEFAULT" | "SETDEFAULT" | "SET_DEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }
}

/// A field of a [`Record`](crate::Record): the property the materializer
/// fills from a same-named column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl FieldSpec {
    /// A non-nullable field.
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
        }
    }

    /// Mark the field as nullable (an `Option<_>` property).
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// True for the implicit `Id` and `IsActive` columns.
    pub fn is_implicit(&self) -> bool {
        self.name.eq_ignore_ascii_case(PRIMARY_KEY) || self.name.eq_ignore_ascii_case(ACTIVE_FLAG)
    }
}
