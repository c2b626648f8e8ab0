//! Entity versions used by the schema tests. Several types share one table
//! name to model a declaration changing between releases.

use sqlentity_core::{
    ColumnType, DescriptorBuilder, Entity, FieldSpec, FromValue, Record, Result, Value,
};

macro_rules! entity {
    ($name:ident, $table:literal, [$($field:expr),* $(,)?] $(, |$b:ident| $describe:expr)?) => {
        #[derive(Debug, Default)]
        pub struct $name {
            pub id: i64,
        }

        impl Record for $name {
            fn fields() -> &'static [FieldSpec] {
                const FIELDS: &[FieldSpec] = &[FieldSpec::new("Id", ColumnType::Integer), $($field),*];
                FIELDS
            }

            fn set_field(&mut self, index: usize, value: &Value) -> Result<()> {
                if index == 0 {
                    self.id = FromValue::from_value(value)?;
                }
                Ok(())
            }
        }

        impl Entity for $name {
            const TABLE: &'static str = $table;

            $(fn describe($b: DescriptorBuilder) -> DescriptorBuilder {
                $describe
            })?

            fn id(&self) -> i64 {
                self.id
            }

            fn set_id(&mut self, id: i64) {
                self.id = id;
            }

            fn field_values(&self) -> Vec<Value> {
                let mut values = vec![Value::Null; Self::fields().len()];
                values[0] = Value::Int(self.id);
                values
            }
        }
    };
}

entity!(Widget, "Widget", [FieldSpec::new("Name", ColumnType::Text)]);

entity!(
    PostV1,
    "Post",
    [FieldSpec::new("Title", ColumnType::Text)],
    |b| b.max_length("Title", 120)
);

entity!(
    PostWide,
    "Post",
    [FieldSpec::new("Title", ColumnType::Text)],
    |b| b.max_length("Title", 200)
);

entity!(
    Post,
    "Post",
    [
        FieldSpec::new("Title", ColumnType::Text),
        FieldSpec::new("WidgetId", ColumnType::Integer),
    ],
    |b| b
        .foreign_key("WidgetId", "Widget")
        .max_length("Title", 120)
        .index(&["Title"])
);

// WidgetId exists but is nullable and unconstrained.
entity!(
    PostLoose,
    "Post",
    [
        FieldSpec::new("Title", ColumnType::Text),
        FieldSpec::new("WidgetId", ColumnType::Integer).nullable(),
    ],
    |b| b.max_length("Title", 120)
);

entity!(Gadget, "Gadget", [FieldSpec::new("Span", ColumnType::Custom("INTERVAL"))]);

entity!(ItemV1, "Item", [FieldSpec::new("Name", ColumnType::Text)]);

entity!(
    ItemNullable,
    "Item",
    [FieldSpec::new("Name", ColumnType::Text).nullable()]
);

entity!(
    ItemV2,
    "Item",
    [
        FieldSpec::new("Name", ColumnType::Text),
        FieldSpec::new("Quantity", ColumnType::Integer),
        FieldSpec::new("Price", ColumnType::Real),
        FieldSpec::new("Code", ColumnType::Guid),
        FieldSpec::new("Seen", ColumnType::DateTime),
        FieldSpec::new("Flag", ColumnType::Boolean),
        FieldSpec::new("Data", ColumnType::Blob),
        FieldSpec::new("Note", ColumnType::Text).nullable(),
    ]
);

entity!(ItemNarrow, "Item", [FieldSpec::new("Label", ColumnType::Text)]);

entity!(ItemRetyped, "Item", [FieldSpec::new("Name", ColumnType::Integer)]);

entity!(
    ItemIndexed,
    "Item",
    [FieldSpec::new("Name", ColumnType::Text)],
    |b| b.index(&["Name"])
);

entity!(
    ItemUnique,
    "Item",
    [FieldSpec::new("Name", ColumnType::Text)],
    |b| b.unique("Name", 1)
);
