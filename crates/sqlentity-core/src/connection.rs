//! Database connection trait.
//!
//! Execution is synchronous and blocking. Statements carry named
//! parameters (`@Age0`) which drivers bind by name.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A named statement parameter. `name` excludes the leading `@`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParam {
    pub name: String,
    pub value: Value,
}

impl SqlParam {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A live database connection.
///
/// Methods take `&self`; drivers synchronize internally.
pub trait Connection {
    /// Run a query and hand each row to `on_row` as it is stepped
    /// (forward-only cursor). Stops at the first error `on_row` returns.
    fn query_each(
        &self,
        sql: &str,
        params: &[SqlParam],
        on_row: &mut dyn FnMut(&Row) -> Result<()>,
    ) -> Result<()>;

    /// Execute a statement and return the number of changed rows.
    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64>;

    /// Execute an INSERT and return the new rowid.
    fn insert(&self, sql: &str, params: &[SqlParam]) -> Result<i64>;

    /// Execute one or more parameterless statements.
    fn execute_batch(&self, sql: &str) -> Result<()>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Collect every row of a query.
    fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        self.query_each(sql, params, &mut |row| {
            rows.push(row.clone());
            Ok(())
        })?;
        Ok(rows)
    }

    /// First row of a query, if any.
    fn query_one(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Row>> {
        let mut first = None;
        self.query_each(sql, params, &mut |row| {
            if first.is_none() {
                first = Some(row.clone());
            }
            Ok(())
        })?;
        Ok(first)
    }
}

impl<C: Connection + ?Sized> Connection for &C {
    fn query_each(
        &self,
        sql: &str,
        params: &[SqlParam],
        on_row: &mut dyn FnMut(&Row) -> Result<()>,
    ) -> Result<()> {
        (**self).query_each(sql, params, on_row)
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn insert(&self, sql: &str, params: &[SqlParam]) -> Result<i64> {
        (**self).insert(sql, params)
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        (**self).execute_batch(sql)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }
}
