//! Live schema introspection for SQLite.
//!
//! Tables come from `sqlite_master`; columns, foreign keys and indexes from
//! the `table_info`, `foreign_key_list`, `index_list` and `index_info`
//! pragmas. SQLite does not report constraint names through the pragmas,
//! so those are recovered from the stored `CREATE TABLE` text.

use crate::snapshot::{
    ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, SchemaSnapshot, TableSnapshot,
    UniqueSnapshot,
};
use regex::Regex;
use sqlentity_core::{Connection, PRIMARY_KEY, Result, Row, quote_ident};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Tables the reconciler never looks at.
const INTERNAL_PREFIX: &str = "sqlite_";

fn fk_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)CONSTRAINT\s+["`\[]?(\w+)["`\]]?\s+FOREIGN\s+KEY\s*\(\s*["`\[]?(\w+)["`\]]?\s*\)"#)
            .unwrap_or_else(|e| unreachable!("foreign key pattern is a valid regex: {e}"))
    })
}

fn unique_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)CONSTRAINT\s+["`\[]?(\w+)["`\]]?\s+UNIQUE\s*\(([^)]*)\)"#)
            .unwrap_or_else(|e| unreachable!("unique pattern is a valid regex: {e}"))
    })
}

/// Constraint names declared in a `CREATE TABLE` statement.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConstraintNames {
    /// Lower-cased column -> foreign key constraint name
    pub foreign_keys: HashMap<String, String>,
    /// Unique constraint name -> member columns
    pub uniques: Vec<(String, Vec<String>)>,
}

impl ConstraintNames {
    /// Parse the named constraints out of `create_sql`.
    pub fn parse(create_sql: &str) -> Self {
        let mut names = Self::default();
        for caps in fk_pattern().captures_iter(create_sql) {
            names
                .foreign_keys
                .insert(caps[2].to_ascii_lowercase(), caps[1].to_string());
        }
        for caps in unique_pattern().captures_iter(create_sql) {
            let columns = caps[2]
                .split(',')
                .map(|c| {
                    c.trim()
                        .trim_matches(|ch| matches!(ch, '"' | '`' | '[' | ']'))
                        .to_string()
                })
                .collect();
            names.uniques.push((caps[1].to_string(), columns));
        }
        names
    }

    fn unique_named(&self, columns: &[String]) -> Option<String> {
        self.uniques
            .iter()
            .find(|(_, declared)| {
                declared.len() == columns.len()
                    && declared
                        .iter()
                        .zip(columns)
                        .all(|(a, b)| a.eq_ignore_ascii_case(b))
            })
            .map(|(name, _)| name.clone())
    }
}

/// Read the live schema of every user table.
#[tracing::instrument(level = "debug", skip(conn))]
pub fn live_snapshot<C: Connection>(conn: &C) -> Result<SchemaSnapshot> {
    let mut schema = SchemaSnapshot::new();
    for (name, create_sql) in table_definitions(conn)? {
        let table = table_snapshot(conn, &name, &create_sql)?;
        schema.insert(table);
    }
    tracing::debug!(tables = schema.tables.len(), "Live schema read");
    Ok(schema)
}

/// `(name, CREATE TABLE text)` for every user table.
pub fn table_definitions<C: Connection>(conn: &C) -> Result<Vec<(String, String)>> {
    let rows = conn.query(
        "SELECT name, sql FROM sqlite_master WHERE type = 'table' ORDER BY name",
        &[],
    )?;
    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row.get_named("name")?;
        if name.starts_with(INTERNAL_PREFIX) {
            continue;
        }
        let sql: Option<String> = row.get_named("sql")?;
        tables.push((name, sql.unwrap_or_default()));
    }
    Ok(tables)
}

/// Live shape of one table.
pub fn table_snapshot<C: Connection>(
    conn: &C,
    table: &str,
    create_sql: &str,
) -> Result<TableSnapshot> {
    let names = ConstraintNames::parse(create_sql);
    let mut snapshot = TableSnapshot::new(table);
    snapshot.columns = columns(conn, table)?;
    snapshot.foreign_keys = foreign_keys(conn, table, &names)?;
    let (uniques, indexes) = indexes(conn, table, &names)?;
    snapshot.unique_constraints = uniques;
    snapshot.indexes = indexes;
    snapshot.normalize();
    Ok(snapshot)
}

fn columns<C: Connection>(conn: &C, table: &str) -> Result<Vec<ColumnSnapshot>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    conn.query(&sql, &[])?
        .iter()
        .map(|row| {
            let name: String = row.get_named("name")?;
            let sql_type: String = row.get_named("type")?;
            let not_null: i64 = row.get_named("notnull")?;
            let pk: i64 = row.get_named("pk")?;
            // INTEGER PRIMARY KEY is never NULL even though notnull reads 0
            Ok(ColumnSnapshot {
                primary_key: pk > 0,
                ..ColumnSnapshot::new(name, sql_type, not_null == 0 && pk == 0)
            })
        })
        .collect()
}

fn foreign_keys<C: Connection>(
    conn: &C,
    table: &str,
    names: &ConstraintNames,
) -> Result<Vec<ForeignKeySnapshot>> {
    let sql = format!("PRAGMA foreign_key_list({})", quote_ident(table));
    conn.query(&sql, &[])?
        .iter()
        .map(|row| {
            let column: String = row.get_named("from")?;
            let foreign_column: Option<String> = row.get_named("to")?;
            Ok(ForeignKeySnapshot {
                name: names.foreign_keys.get(&column.to_ascii_lowercase()).cloned(),
                foreign_table: row.get_named("table")?,
                foreign_column: foreign_column.unwrap_or_else(|| PRIMARY_KEY.to_string()),
                on_delete: row.get_named::<String>("on_delete")?.to_ascii_uppercase(),
                column,
            })
        })
        .collect()
}

fn indexes<C: Connection>(
    conn: &C,
    table: &str,
    names: &ConstraintNames,
) -> Result<(Vec<UniqueSnapshot>, Vec<IndexSnapshot>)> {
    let sql = format!("PRAGMA index_list({})", quote_ident(table));
    let mut uniques = Vec::new();
    let mut plain = Vec::new();
    for row in conn.query(&sql, &[])? {
        let name: String = row.get_named("name")?;
        let origin: String = row.get_named("origin")?;
        match origin.as_str() {
            "u" => {
                let columns = index_columns(conn, &name)?;
                uniques.push(UniqueSnapshot {
                    name: names.unique_named(&columns),
                    columns,
                });
            }
            "c" => {
                let columns = index_columns(conn, &name)?;
                plain.push(IndexSnapshot { name, columns });
            }
            // primary key
            _ => {}
        }
    }
    Ok((uniques, plain))
}

fn index_columns<C: Connection>(conn: &C, index: &str) -> Result<Vec<String>> {
    let sql = format!("PRAGMA index_info({})", quote_ident(index));
    let rows = conn.query(&sql, &[])?;
    let mut columns = rows
        .iter()
        .map(|row: &Row| Ok((row.get_named::<i64>("seqno")?, row.get_named::<String>("name")?)))
        .collect::<Result<Vec<_>>>()?;
    columns.sort_by_key(|(seq, _)| *seq);
    Ok(columns.into_iter().map(|(_, name)| name).collect())
}
