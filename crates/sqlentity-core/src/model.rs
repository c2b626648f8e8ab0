//! Record and Entity traits for struct <-> row mapping.
//!
//! A [`Record`] is anything the materializer can fill from a row: a
//! `Default` struct that lists its fields and accepts one value per field.
//! An [`Entity`] is a record backed by its own table.
//!
//! Entities are declared explicitly:
//!
//! ```ignore
//! #[derive(Debug, Default)]
//! struct Person { id: i64, name: String, age: i64 }
//!
//! impl Record for Person {
//!     fn fields() -> &'static [FieldSpec] {
//!         const FIELDS: &[FieldSpec] = &[
//!             FieldSpec::new("Id", ColumnType::Integer),
//!             FieldSpec::new("Name", ColumnType::Text),
//!             FieldSpec::new("Age", ColumnType::Integer),
//!         ];
//!         FIELDS
//!     }
//!     fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
//!         match index {
//!             0 => self.id = FromValue::from_value(value)?,
//!             1 => self.name = FromValue::from_value(value)?,
//!             2 => self.age = FromValue::from_value(value)?,
//!             _ => {}
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::Result;
use crate::descriptor::DescriptorBuilder;
use crate::field::FieldSpec;
use crate::value::Value;
use std::sync::{Arc, RwLock};

/// Shared handle to a materialized instance inside an object graph.
///
/// The identity map hands out one handle per (type, primary key), so two
/// parents referencing the same row hold the same instance.
pub type EntityRef<T> = Arc<RwLock<T>>;

/// A struct that can be populated from a result row.
pub trait Record: Default + Send + Sync + 'static {
    /// Fields in declaration order.
    fn fields() -> &'static [FieldSpec];

    /// Assign the (already type-coerced) value of the field at `index`.
    fn set_field(&mut self, index: usize, value: &Value) -> Result<()>;

    /// Index of a field by name, ignoring ASCII case.
    fn field_index(name: &str) -> Option<usize> {
        Self::fields()
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// A record persisted in its own table.
pub trait Entity: Record {
    /// Table name. Must be a plain identifier.
    const TABLE: &'static str;

    /// Declare table metadata beyond the field list: soft delete, foreign
    /// keys, uniqueness groups, lengths.
    fn describe(builder: DescriptorBuilder) -> DescriptorBuilder {
        builder
    }

    /// Surrogate primary key; `0` means not yet inserted.
    fn id(&self) -> i64;

    /// Store the key assigned on insert.
    fn set_id(&mut self, id: i64);

    /// Current value of every field, aligned with [`Record::fields`].
    fn field_values(&self) -> Vec<Value>;

    /// True if this instance has not been inserted yet.
    fn is_new(&self) -> bool {
        self.id() == 0
    }
}
