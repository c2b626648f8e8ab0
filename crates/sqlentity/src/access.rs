//! Standard data-access operations.
//!
//! [`DataAccess`] is implemented for every [`Session`]: the context itself
//! (one connection per call) and a [`TransactionScope`](crate::TransactionScope).
//! Each operation returns an [`Outcome`]; a failing SQL command degrades to
//! the operation's default value, is reported to the failure sink, and
//! faults the enclosing transaction scope.

use crate::context::DataContext;
use crate::materialize;
use crate::outcome::Outcome;
use sqlentity_core::{
    ACTIVE_FLAG, Connection, Entity, EntityDescriptor, EntityRef, Error, FailureEvent, PRIMARY_KEY,
    Record, Result, SqlParam, Value, quote_ident,
};
use sqlentity_query::{
    Filter, IncludePlan, JoinGraph, PredicateCompiler, ROOT_ALIAS, SqlFragment, StoredView,
};

/// Something data-access calls can run against.
pub trait Session {
    fn context(&self) -> &DataContext;

    /// Run `f` on this session's connection.
    fn with_connection<T>(&self, f: impl FnOnce(&dyn Connection) -> Result<T>) -> Result<T>;

    /// Called after a command failed.
    fn fault(&self) {}
}

/// Turn an operation result into an [`Outcome`]: command failures degrade
/// to `T::default()`, everything else is fatal.
fn settle<S, T>(session: &S, operation: &'static str, table: &str, result: Result<T>) -> Outcome<T>
where
    S: Session + ?Sized,
    T: Default,
{
    match result {
        Ok(value) => Outcome::Ok(value),
        Err(error) if error.is_command_failure() => {
            let mut event = FailureEvent::new(operation, error.to_string()).context(table);
            if let Some(sql) = error.sql() {
                event = event.detail(sql);
            }
            session.context().sink().record(event);
            session.fault();
            Outcome::Degraded {
                value: T::default(),
                error,
            }
        }
        Err(error) => Outcome::Err(error),
    }
}

fn column_list(descriptor: &EntityDescriptor) -> String {
    descriptor
        .all_columns()
        .iter()
        .map(|(column, _)| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `WHERE` clause for `filter` plus the activation guard of soft-delete
/// tables. Empty when there is nothing to filter on.
fn where_clause<E: Entity>(
    context: &DataContext,
    descriptor: &EntityDescriptor,
    filter: Option<&Filter<E>>,
    active_only: bool,
) -> Result<SqlFragment> {
    let mut conditions = Vec::new();
    let mut params = Vec::new();
    if let Some(filter) = filter {
        let options = context.compile_options();
        let mut counter = 0;
        let compiled = PredicateCompiler::new(descriptor, &options).compile(filter, &mut counter)?;
        conditions.push(compiled.sql);
        params = compiled.params;
    }
    if active_only && descriptor.soft_delete {
        conditions.push(format!("{} = 1", quote_ident(ACTIVE_FLAG)));
    }
    let sql = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    Ok(SqlFragment { sql, params })
}

fn select_statement<E: Entity>(
    context: &DataContext,
    filter: Option<&Filter<E>>,
    tail: &str,
) -> Result<SqlFragment> {
    let descriptor = context.registry().descriptor::<E>()?;
    let clause = where_clause(context, descriptor, filter, true)?;
    Ok(SqlFragment {
        sql: format!(
            "SELECT {} FROM {}{}{tail}",
            column_list(descriptor),
            quote_ident(&descriptor.table),
            clause.sql
        ),
        params: clause.params,
    })
}

/// Named parameters for the declared columns of `entity`, in descriptor
/// order: `(quoted column, parameter)`.
fn column_params<E: Entity>(
    descriptor: &EntityDescriptor,
    entity: &E,
) -> Vec<(String, SqlParam)> {
    let values = entity.field_values();
    descriptor
        .columns
        .iter()
        .enumerate()
        .filter_map(|(n, column)| {
            let index = E::field_index(&column.name)?;
            let value = values.get(index).cloned().unwrap_or(Value::Null);
            Some((
                quote_ident(&column.name),
                SqlParam::new(format!("{}{n}", column.name), value),
            ))
        })
        .collect()
}

fn id_param(entity: &impl Entity, index: usize) -> SqlParam {
    SqlParam::new(format!("{PRIMARY_KEY}{index}"), entity.id())
}

fn unsaved(table: &str) -> Error {
    Error::Custom(format!("{table}: entity has no primary key yet"))
}

/// Data-access operations available on every [`Session`].
pub trait DataAccess: Session {
    /// Entities matching `filter`; soft-deleted rows are excluded.
    #[tracing::instrument(level = "debug", skip_all, fields(table = E::TABLE))]
    fn fetch<E: Entity>(&self, filter: &Filter<E>) -> Outcome<Vec<E>> {
        let result = select_statement(self.context(), Some(filter), "").and_then(|statement| {
            tracing::debug!(sql = %statement.sql, "Fetch");
            let format = &self.context().config().datetime_format;
            self.with_connection(|conn| {
                materialize::fetch_records(conn, &statement.sql, &statement.params, format)
            })
        });
        settle(self, "fetch", E::TABLE, result)
    }

    fn fetch_all<E: Entity>(&self) -> Outcome<Vec<E>> {
        self.fetch(&Filter::always())
    }

    /// First match by primary key order.
    fn first<E: Entity>(&self, filter: &Filter<E>) -> Outcome<Option<E>> {
        let tail = format!(" ORDER BY {} LIMIT 1", quote_ident(PRIMARY_KEY));
        let result = select_statement(self.context(), Some(filter), &tail).and_then(|statement| {
            tracing::debug!(sql = %statement.sql, "First");
            let format = &self.context().config().datetime_format;
            self.with_connection(|conn| {
                materialize::fetch_records(conn, &statement.sql, &statement.params, format)
            })
        });
        settle(self, "first", E::TABLE, result.map(|rows| rows.into_iter().next()))
    }

    fn count<E: Entity>(&self, filter: &Filter<E>) -> Outcome<i64> {
        let result = (|| -> Result<i64> {
            let descriptor = self.context().registry().descriptor::<E>()?;
            let clause = where_clause(self.context(), descriptor, Some(filter), true)?;
            let sql = format!(
                "SELECT COUNT(*) FROM {}{}",
                quote_ident(&descriptor.table),
                clause.sql
            );
            tracing::debug!(sql = %sql, "Count");
            self.with_connection(|conn| match conn.query_one(&sql, &clause.params)? {
                Some(row) => row.get_as::<i64>(0),
                None => Ok(0),
            })
        })();
        settle(self, "count", E::TABLE, result)
    }

    /// Insert `entity` and store the new primary key on it.
    fn insert<E: Entity>(&self, entity: &mut E) -> Outcome<i64> {
        let result = (|| -> Result<i64> {
            let descriptor = self.context().registry().descriptor::<E>()?;
            let columns = column_params(descriptor, entity);
            let sql = if columns.is_empty() {
                format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&descriptor.table))
            } else {
                let names: Vec<&str> = columns.iter().map(|(c, _)| c.as_str()).collect();
                let slots: Vec<String> = columns
                    .iter()
                    .map(|(_, p)| format!("@{}", p.name))
                    .collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote_ident(&descriptor.table),
                    names.join(", "),
                    slots.join(", ")
                )
            };
            let params: Vec<SqlParam> = columns.into_iter().map(|(_, p)| p).collect();
            tracing::debug!(sql = %sql, "Insert");
            self.with_connection(|conn| conn.insert(&sql, &params))
        })();
        if let Ok(id) = result {
            entity.set_id(id);
        }
        settle(self, "insert", E::TABLE, result)
    }

    /// Write every declared column of `entity` back to its row.
    fn update<E: Entity>(&self, entity: &E) -> Outcome<u64> {
        let result = (|| -> Result<u64> {
            if entity.is_new() {
                return Err(unsaved(E::TABLE));
            }
            let descriptor = self.context().registry().descriptor::<E>()?;
            let columns = column_params(descriptor, entity);
            if columns.is_empty() {
                return Ok(0);
            }
            let assignments: Vec<String> = columns
                .iter()
                .map(|(column, p)| format!("{column} = @{}", p.name))
                .collect();
            let id = id_param(entity, columns.len());
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = @{}",
                quote_ident(&descriptor.table),
                assignments.join(", "),
                quote_ident(PRIMARY_KEY),
                id.name
            );
            let mut params: Vec<SqlParam> = columns.into_iter().map(|(_, p)| p).collect();
            params.push(id);
            tracing::debug!(sql = %sql, "Update");
            self.with_connection(|conn| conn.execute(&sql, &params))
        })();
        settle(self, "update", E::TABLE, result)
    }

    /// Delete `entity`. Soft-delete tables only clear the activation flag.
    fn delete<E: Entity>(&self, entity: &E) -> Outcome<u64> {
        let result = (|| -> Result<u64> {
            if entity.is_new() {
                return Err(unsaved(E::TABLE));
            }
            let descriptor = self.context().registry().descriptor::<E>()?;
            let id = id_param(entity, 0);
            let clause = SqlFragment {
                sql: format!(" WHERE {} = @{}", quote_ident(PRIMARY_KEY), id.name),
                params: vec![id],
            };
            self.with_connection(|conn| remove(conn, descriptor, &clause))
        })();
        settle(self, "delete", E::TABLE, result)
    }

    /// Delete every row matching `filter`, soft-delete aware.
    fn delete_where<E: Entity>(&self, filter: &Filter<E>) -> Outcome<u64> {
        let result = (|| -> Result<u64> {
            let descriptor = self.context().registry().descriptor::<E>()?;
            let clause = where_clause(self.context(), descriptor, Some(filter), false)?;
            self.with_connection(|conn| remove(conn, descriptor, &clause))
        })();
        settle(self, "delete", E::TABLE, result)
    }

    /// Roots matching `filter` with every navigation of `plan` loaded.
    #[tracing::instrument(level = "debug", skip_all, fields(table = R::TABLE))]
    fn fetch_graph<R: Entity>(
        &self,
        plan: &IncludePlan<R>,
        filter: Option<&Filter<R>>,
    ) -> Outcome<Vec<EntityRef<R>>> {
        let result = (|| -> Result<Vec<EntityRef<R>>> {
            let compiled = match filter {
                Some(filter) => {
                    let options = self.context().compile_options();
                    let mut counter = 0;
                    Some(
                        PredicateCompiler::new(plan.root(), &options)
                            .alias(ROOT_ALIAS)
                            .compile(filter, &mut counter)?,
                    )
                }
                None => None,
            };
            let statement = plan.select_sql(compiled.as_ref());
            tracing::debug!(sql = %statement.sql, steps = plan.steps().len(), "Eager load");
            let format = &self.context().config().datetime_format;
            self.with_connection(|conn| materialize::fetch_graph(conn, plan, &statement, format))
        })();
        settle(self, "fetch_graph", R::TABLE, result)
    }

    /// Execute a join graph, projecting onto `D`. An ignored graph yields
    /// no rows.
    fn run_join<L: Entity, R: Entity, D: Record>(
        &self,
        graph: &JoinGraph<L, R>,
    ) -> Outcome<Vec<D>> {
        let result = graph
            .statement::<D>()
            .and_then(|statement| run_statement(self, statement.as_ref()));
        settle(self, "join", L::TABLE, result)
    }

    /// Execute a stored join view.
    fn run_view<D: Record>(&self, view: &StoredView) -> Outcome<Vec<D>> {
        let result = run_statement(self, view.statement());
        settle(self, "view", view.destination, result)
    }
}

impl<S: Session + ?Sized> DataAccess for S {}

fn run_statement<S, D>(session: &S, statement: Option<&SqlFragment>) -> Result<Vec<D>>
where
    S: Session + ?Sized,
    D: Record,
{
    let Some(statement) = statement else {
        tracing::warn!(
            destination = std::any::type_name::<D>(),
            "Join graph was ignored; returning no rows"
        );
        return Ok(Vec::new());
    };
    tracing::debug!(sql = %statement.sql, "Join");
    let format = &session.context().config().datetime_format;
    session.with_connection(|conn| {
        materialize::fetch_records(conn, &statement.sql, &statement.params, format)
    })
}

/// Physical delete, or an activation-flag update for soft-delete tables.
fn remove(
    conn: &dyn Connection,
    descriptor: &EntityDescriptor,
    clause: &SqlFragment,
) -> Result<u64> {
    let table = quote_ident(&descriptor.table);
    let sql = if descriptor.soft_delete {
        format!("UPDATE {table} SET {} = 0{}", quote_ident(ACTIVE_FLAG), clause.sql)
    } else {
        format!("DELETE FROM {table}{}", clause.sql)
    };
    tracing::debug!(sql = %sql, soft = descriptor.soft_delete, "Delete");
    conn.execute(&sql, &clause.params)
}
