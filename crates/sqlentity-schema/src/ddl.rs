//! SQLite DDL generation.
//!
//! SQLite cannot alter a column or a table constraint in place, so any such
//! change rebuilds the table: create `__rebuild_<table>` with the target
//! shape, copy the surviving columns, drop the old table, rename, and
//! recreate indexes.

use crate::diff::ColumnCopy;
use crate::expected::{fk_constraint_name, unique_constraint_name};
use crate::snapshot::{ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, TableSnapshot, UniqueSnapshot};
use sqlentity_core::{ACTIVE_FLAG, quote_ident};

/// Name of the temporary table used while rebuilding `table`.
pub fn rebuild_name(table: &str) -> String {
    format!("__rebuild_{table}")
}

/// Format a column definition for CREATE TABLE.
fn column_def(column: &ColumnSnapshot) -> String {
    let name = quote_ident(&column.name);
    if column.primary_key {
        return format!("{name} {} PRIMARY KEY AUTOINCREMENT", column.sql_type);
    }
    let mut sql = format!("{name} {}", column.sql_type);
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if column.name.eq_ignore_ascii_case(ACTIVE_FLAG) {
        sql.push_str(" DEFAULT 1");
    }
    sql
}

fn fk_constraint(table: &str, fk: &ForeignKeySnapshot) -> String {
    let name = fk
        .name
        .clone()
        .unwrap_or_else(|| fk_constraint_name(table, &fk.column));
    let mut sql = format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_ident(&name),
        quote_ident(&fk.column),
        quote_ident(&fk.foreign_table),
        quote_ident(&fk.foreign_column)
    );
    if !fk.on_delete.eq_ignore_ascii_case("NO ACTION") {
        sql.push_str(&format!(" ON DELETE {}", fk.on_delete));
    }
    sql
}

fn unique_constraint(table: &str, unique: &UniqueSnapshot, ordinal: u32) -> String {
    let name = unique
        .name
        .clone()
        .unwrap_or_else(|| unique_constraint_name(table, ordinal));
    let columns: Vec<String> = unique.columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CONSTRAINT {} UNIQUE ({})",
        quote_ident(&name),
        columns.join(", ")
    )
}

/// `CREATE TABLE` for `table`, under `name`.
fn create_table_named(table: &TableSnapshot, name: &str) -> String {
    let mut parts: Vec<String> = table.columns.iter().map(column_def).collect();
    for (ordinal, unique) in (1..).zip(&table.unique_constraints) {
        parts.push(unique_constraint(&table.name, unique, ordinal));
    }
    for fk in &table.foreign_keys {
        parts.push(fk_constraint(&table.name, fk));
    }
    let sql = format!(
        "CREATE TABLE {} (\n  {}\n)",
        quote_ident(name),
        parts.join(",\n  ")
    );
    tracing::trace!(sql = %sql, "Generated CREATE TABLE statement");
    sql
}

/// `CREATE TABLE` for `table`.
pub fn create_table(table: &TableSnapshot) -> String {
    create_table_named(table, &table.name)
}

/// `CREATE TABLE` followed by the table's indexes.
pub fn create_table_with_indexes(table: &TableSnapshot) -> Vec<String> {
    tracing::debug!(table = %table.name, columns = table.columns.len(), "Generating CREATE TABLE DDL");
    let mut statements = vec![create_table(table)];
    statements.extend(table.indexes.iter().map(|i| create_index(&table.name, i)));
    statements
}

pub fn create_index(table: &str, index: &IndexSnapshot) -> String {
    let columns: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE INDEX {} ON {} ({})",
        quote_ident(&index.name),
        quote_ident(table),
        columns.join(", ")
    )
}

pub fn drop_index(name: &str) -> String {
    format!("DROP INDEX {}", quote_ident(name))
}

/// Rebuild `target` from the live table of the same name, filling each
/// target column from its `copy` expression. Target columns without a copy
/// entry start out NULL.
pub fn rebuild_table(target: &TableSnapshot, copy: &[ColumnCopy]) -> Vec<String> {
    let table = target.name.as_str();
    let temp = rebuild_name(table);
    tracing::debug!(table, temp = %temp, "Generating table rebuild DDL");

    let columns: Vec<String> = copy.iter().map(|c| quote_ident(&c.column)).collect();
    let exprs: Vec<&str> = copy.iter().map(|c| c.expr.as_str()).collect();

    let mut statements = vec![
        create_table_named(target, &temp),
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&temp),
            columns.join(", "),
            exprs.join(", "),
            quote_ident(table)
        ),
        format!("DROP TABLE {}", quote_ident(table)),
        format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&temp),
            quote_ident(table)
        ),
    ];
    statements.extend(target.indexes.iter().map(|i| create_index(table, i)));
    statements
}
