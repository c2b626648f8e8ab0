//! Entity descriptors: the table-level metadata of a registered entity.
//!
//! A descriptor is computed once per entity type by the registry and is
//! read-only afterwards. The predicate compiler, join planner, include
//! plans and the schema reconciler all read from it.

use crate::field::{ACTIVE_FLAG, FieldSpec, PRIMARY_KEY, ReferentialAction};
use crate::model::Record;
use crate::types::ColumnType;
use std::collections::BTreeMap;

/// Foreign key reference from a column to another table's column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub table: String,
    pub column: String,
    pub on_delete: ReferentialAction,
}

impl ForeignKeySpec {
    /// Reference the primary key of `table`.
    pub fn to(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: PRIMARY_KEY.to_string(),
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// Set the ON DELETE action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }
}

/// One declared (non-implicit) column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub max_length: Option<u32>,
    pub foreign_key: Option<ForeignKeySpec>,
    /// Columns sharing a group id form one UNIQUE constraint.
    pub unique_group: Option<u32>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            max_length: None,
            foreign_key: None,
            unique_group: None,
        }
    }

    fn from_field(field: &FieldSpec) -> Self {
        Self {
            nullable: field.nullable,
            ..Self::new(field.name, field.column_type)
        }
    }
}

/// A plain (non-unique) index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub columns: Vec<String>,
}

/// Table-level metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub table: String,
    /// Rust type name, for diagnostics
    pub type_name: &'static str,
    /// Declared columns in order, excluding `Id` and `IsActive`
    pub columns: Vec<ColumnDescriptor>,
    pub soft_delete: bool,
    pub indexes: Vec<IndexSpec>,
}

impl EntityDescriptor {
    /// Primary key column name.
    pub fn primary_key(&self) -> &'static str {
        PRIMARY_KEY
    }

    /// Find a declared column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDescriptor> {
        self.columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Resolve any column, implicit ones included, to its declared spelling
    /// and type.
    pub fn resolve_column(&self, name: &str) -> Option<(&str, ColumnType)> {
        if name.eq_ignore_ascii_case(PRIMARY_KEY) {
            return Some((PRIMARY_KEY, ColumnType::Integer));
        }
        if name.eq_ignore_ascii_case(ACTIVE_FLAG) {
            return Some((ACTIVE_FLAG, ColumnType::Boolean));
        }
        self.column(name).map(|c| (c.name.as_str(), c.column_type))
    }

    /// Every physical column: `Id`, declared columns, `IsActive`.
    pub fn all_columns(&self) -> Vec<(&str, ColumnType)> {
        let mut out = Vec::with_capacity(self.columns.len() + 2);
        out.push((PRIMARY_KEY, ColumnType::Integer));
        out.extend(self.columns.iter().map(|c| (c.name.as_str(), c.column_type)));
        out.push((ACTIVE_FLAG, ColumnType::Boolean));
        out
    }

    /// Columns carrying a foreign key.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&ColumnDescriptor, &ForeignKeySpec)> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref().map(|fk| (c, fk)))
    }

    /// First column referencing `table`, ignoring ASCII case.
    pub fn foreign_key_to(&self, table: &str) -> Option<&ColumnDescriptor> {
        self.foreign_keys()
            .find(|(_, fk)| fk.table.eq_ignore_ascii_case(table))
            .map(|(c, _)| c)
    }

    /// Uniqueness groups: group id -> member columns in declaration order.
    pub fn unique_groups(&self) -> BTreeMap<u32, Vec<&str>> {
        let mut groups: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
        for column in &self.columns {
            if let Some(group) = column.unique_group {
                groups.entry(group).or_default().push(&column.name);
            }
        }
        groups
    }

    pub(crate) fn next_unique_group(&self) -> u32 {
        self.columns
            .iter()
            .filter_map(|c| c.unique_group)
            .max()
            .map_or(1, |g| g + 1)
    }
}

/// Builder handed to [`Entity::describe`](crate::Entity::describe).
///
/// Unknown column names are collected and reported when the registry is
/// built rather than panicking here.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    descriptor: EntityDescriptor,
    problems: Vec<String>,
}

impl DescriptorBuilder {
    /// Start from a record's field list.
    pub fn from_record<R: Record>(table: &str) -> Self {
        let columns = R::fields()
            .iter()
            .filter(|f| !f.is_implicit())
            .map(ColumnDescriptor::from_field)
            .collect();
        Self {
            descriptor: EntityDescriptor {
                table: table.to_string(),
                type_name: std::any::type_name::<R>(),
                columns,
                soft_delete: false,
                indexes: Vec::new(),
            },
            problems: Vec::new(),
        }
    }

    fn with_column(mut self, name: &str, f: impl FnOnce(&mut ColumnDescriptor)) -> Self {
        match self.descriptor.column_mut(name) {
            Some(column) => f(column),
            None => self.problems.push(format!(
                "{}: no declared column named '{}'",
                self.descriptor.table, name
            )),
        }
        self
    }

    /// Deleting clears `IsActive` instead of removing the row.
    pub fn soft_delete(mut self) -> Self {
        self.descriptor.soft_delete = true;
        self
    }

    /// `column` references the primary key of `table`.
    pub fn foreign_key(self, column: &str, table: &str) -> Self {
        self.foreign_key_with(column, ForeignKeySpec::to(table))
    }

    /// `column` references `spec`.
    pub fn foreign_key_with(self, column: &str, spec: ForeignKeySpec) -> Self {
        self.with_column(column, |c| c.foreign_key = Some(spec))
    }

    /// Put `column` in uniqueness group `group`.
    pub fn unique(self, column: &str, group: u32) -> Self {
        self.with_column(column, |c| c.unique_group = Some(group))
    }

    /// Bound the length of a text column.
    pub fn max_length(self, column: &str, length: u32) -> Self {
        self.with_column(column, |c| c.max_length = Some(length))
    }

    pub fn nullable(self, column: &str) -> Self {
        self.with_column(column, |c| c.nullable = true)
    }

    pub fn required(self, column: &str) -> Self {
        self.with_column(column, |c| c.nullable = false)
    }

    /// Plain index over `columns`.
    pub fn index(mut self, columns: &[&str]) -> Self {
        for name in columns {
            if self.descriptor.resolve_column(name).is_none() {
                self.problems.push(format!(
                    "{}: index references unknown column '{}'",
                    self.descriptor.table, name
                ));
            }
        }
        self.descriptor.indexes.push(IndexSpec {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        });
        self
    }

    pub(crate) fn finish(self) -> (EntityDescriptor, Vec<String>) {
        (self.descriptor, self.problems)
    }
}
