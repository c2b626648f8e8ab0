//! Target schema extraction from entity descriptors.
//!
//! Every table gets the implicit `Id` primary key and `IsActive` flag
//! around its declared columns. Constraint and index names are derived
//! deterministically so the live catalog reads them back unchanged.

use crate::snapshot::{
    ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, SchemaSnapshot, TableSnapshot,
    UniqueSnapshot,
};
use sqlentity_core::{
    ACTIVE_FLAG, EntityDescriptor, EntityRegistry, Error, PRIMARY_KEY, Result, SchemaErrorKind,
};

/// Name of the foreign key constraint on `table.column`.
pub fn fk_constraint_name(table: &str, column: &str) -> String {
    format!("FK_{table}_{column}")
}

/// Name of the UNIQUE constraint for uniqueness group `group`.
pub fn unique_constraint_name(table: &str, group: u32) -> String {
    format!("UQ_{table}_{group}")
}

/// Name of a plain index over `columns`.
pub fn index_name(table: &str, columns: &[String]) -> String {
    format!("IX_{table}_{}", columns.join("_"))
}

/// Build the target snapshot of every registered entity.
///
/// Fails with `UnsupportedColumnType` on the first column whose type has no
/// SQLite mapping, before anything touches the database.
pub fn target_snapshot(registry: &EntityRegistry) -> Result<SchemaSnapshot> {
    let mut schema = SchemaSnapshot::new();
    for descriptor in registry.descriptors() {
        schema.insert(table_snapshot(descriptor)?);
    }
    Ok(schema)
}

/// Target shape of one entity's table.
pub fn table_snapshot(descriptor: &EntityDescriptor) -> Result<TableSnapshot> {
    let table = descriptor.table.as_str();
    let mut snapshot = TableSnapshot::new(table);

    snapshot.columns.push(ColumnSnapshot {
        primary_key: true,
        ..ColumnSnapshot::new(PRIMARY_KEY, "INTEGER", false)
    });
    for column in &descriptor.columns {
        let Some(sql_type) = column.column_type.sql_name(column.max_length) else {
            return Err(Error::schema(
                SchemaErrorKind::UnsupportedColumnType,
                format!(
                    "{table}.{}: column type '{}' has no SQLite mapping",
                    column.name,
                    column.column_type.label()
                ),
            ));
        };
        snapshot
            .columns
            .push(ColumnSnapshot::new(&column.name, sql_type, column.nullable));
    }
    snapshot
        .columns
        .push(ColumnSnapshot::new(ACTIVE_FLAG, "BOOLEAN", false));

    for (column, fk) in descriptor.foreign_keys() {
        snapshot.foreign_keys.push(ForeignKeySnapshot {
            name: Some(fk_constraint_name(table, &column.name)),
            column: column.name.clone(),
            foreign_table: fk.table.clone(),
            foreign_column: fk.column.clone(),
            on_delete: fk.on_delete.as_sql().to_string(),
        });
    }

    for (group, columns) in descriptor.unique_groups() {
        snapshot.unique_constraints.push(UniqueSnapshot {
            name: Some(unique_constraint_name(table, group)),
            columns: columns.into_iter().map(String::from).collect(),
        });
    }

    for index in &descriptor.indexes {
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| {
                descriptor
                    .resolve_column(c)
                    .map_or_else(|| c.clone(), |(name, _)| name.to_string())
            })
            .collect();
        snapshot.indexes.push(IndexSnapshot {
            name: index_name(table, &columns),
            columns,
        });
    }

    snapshot.normalize();
    Ok(snapshot)
}
