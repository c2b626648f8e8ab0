//! Join graphs.
//!
//! A [`JoinGraph<L, R>`] is a typed cursor over a [`JoinPlan`]: `L` and `R`
//! are the two sides of the most recent join, so `on`, `where_first` and
//! `where_second` are checked against the right entities.
//!
//! ```ignore
//! let plan = JoinGraph::<Blog, Author>::start(registry, options, "b", "a", JoinKind::Inner)?
//!     .on("AuthorId", "Id")
//!     .where_second(Col::new("Name").starts_with("A"))
//!     .then()
//!     .left_join::<Blog, Post>("p")?
//!     .on("Id", "BlogId")
//!     .into_plan();
//! let statement = plan.statement::<BlogLine>()?;
//! ```
//!
//! Continuing from an entity that was never bound does not fail; the plan
//! is marked ignored and executes to an empty result.

use crate::compile::{CompileOptions, PredicateCompiler, SqlFragment};
use crate::predicate::Filter;
use sqlentity_core::{
    ACTIVE_FLAG, Entity, EntityDescriptor, EntityRegistry, Error, Record, Result, SqlParam,
    quote_ident,
};
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

/// Kinds of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
        }
    }
}

/// One table bound into the graph.
#[derive(Debug, Clone)]
pub struct Binding {
    pub type_id: TypeId,
    pub descriptor: Arc<EntityDescriptor>,
    pub alias: String,
}

#[derive(Debug, Clone)]
struct JoinClause {
    kind: JoinKind,
    /// Index of the joined binding
    binding: usize,
    condition: Option<String>,
}

#[derive(Debug, Clone)]
struct Pin {
    binding: usize,
    property: String,
}

/// Untyped join state, shared by every step of a chain.
#[derive(Debug, Clone)]
pub struct JoinPlan {
    registry: Arc<EntityRegistry>,
    options: CompileOptions,
    bindings: Vec<Binding>,
    joins: Vec<JoinClause>,
    filters: Vec<String>,
    params: Vec<SqlParam>,
    counter: usize,
    pins: Vec<Pin>,
    ignored: Option<String>,
    /// Deferred strict-mode failure
    failure: Option<(String, String)>,
    left: usize,
    right: usize,
}

impl JoinPlan {
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.alias.as_str()).collect()
    }

    /// Why the plan was ignored, if it was.
    pub fn ignored(&self) -> Option<&str> {
        self.ignored.as_deref()
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored.is_some()
    }

    fn unique_alias(&self, requested: &str) -> String {
        let taken = |a: &str| self.bindings.iter().any(|b| b.alias.eq_ignore_ascii_case(a));
        if !taken(requested) {
            return requested.to_string();
        }
        (1..)
            .map(|n| format!("{requested}{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| requested.to_string())
    }

    fn bind<E: Entity>(&mut self, alias: &str) -> Result<usize> {
        let descriptor = self.registry.shared::<E>()?;
        let alias = self.unique_alias(alias);
        self.bindings.push(Binding {
            type_id: TypeId::of::<E>(),
            descriptor,
            alias,
        });
        Ok(self.bindings.len() - 1)
    }

    fn latest(&self, type_id: TypeId) -> Option<usize> {
        self.bindings.iter().rposition(|b| b.type_id == type_id)
    }

    fn ignore(&mut self, reason: String) {
        if self.ignored.is_none() {
            tracing::warn!(reason = %reason, "Join graph ignored");
            self.ignored = Some(reason);
        }
    }

    /// `left.key = right.other`, or `None` when either column is unknown.
    fn equality(&mut self, key: &str, other_key: &str) -> Option<String> {
        let left = &self.bindings[self.left];
        let right = &self.bindings[self.right];
        let resolved = (
            left.descriptor.resolve_column(key),
            right.descriptor.resolve_column(other_key),
        );
        match resolved {
            (Some((l, _)), Some((r, _))) => Some(format!(
                "{}.{} = {}.{}",
                left.alias, l, right.alias, r
            )),
            _ => {
                let reason = format!(
                    "cannot join {}.{} to {}.{}",
                    left.descriptor.table, key, right.descriptor.table, other_key
                );
                let table = right.descriptor.table.clone();
                match self.options.degrade(&table, &reason) {
                    Ok(fragment) => Some(fragment.sql),
                    Err(_) => {
                        self.failure.get_or_insert((table, reason));
                        None
                    }
                }
            }
        }
    }

    fn add_condition(&mut self, sql: String, glue: Option<&str>) {
        if let Some(join) = self.joins.last_mut() {
            join.condition = Some(match (join.condition.take(), glue) {
                (Some(existing), Some("OR")) => format!("({existing} OR {sql})"),
                (Some(existing), _) => format!("{existing} AND {sql}"),
                (None, _) => sql,
            });
        }
    }

    fn add_filter<T>(&mut self, binding: usize, filter: &Filter<T>) {
        let descriptor = Arc::clone(&self.bindings[binding].descriptor);
        let alias = self.bindings[binding].alias.clone();
        let compiled = PredicateCompiler::new(&descriptor, &self.options)
            .alias(&alias)
            .compile(filter, &mut self.counter);
        match compiled {
            Ok(fragment) => {
                self.filters.push(fragment.sql);
                self.params.extend(fragment.params);
            }
            Err(e) => {
                self.failure
                    .get_or_insert((descriptor.table.clone(), e.to_string()));
            }
        }
    }

    /// Source column for each field of `D`: pinned sources first, then the
    /// first binding in join order with a same-name, same-type column.
    fn projection<D: Record>(&self) -> Vec<String> {
        D::fields()
            .iter()
            .filter_map(|field| {
                let pinned = self
                    .pins
                    .iter()
                    .rev()
                    .find(|p| p.property.eq_ignore_ascii_case(field.name))
                    .map(|p| &self.bindings[p.binding])
                    .and_then(|b| b.descriptor.resolve_column(field.name).map(|c| (b, c.0)));
                let source = pinned.or_else(|| {
                    self.bindings.iter().find_map(|b| {
                        b.descriptor
                            .resolve_column(field.name)
                            .filter(|(_, ty)| *ty == field.column_type)
                            .map(|(name, _)| (b, name))
                    })
                });
                source.map(|(b, column)| {
                    format!("{}.{} AS {}", b.alias, column, quote_ident(field.name))
                })
            })
            .collect()
    }

    fn render<D: Record>(&self, guard: bool) -> Result<SqlFragment> {
        if let Some((entity, reason)) = &self.failure {
            return Err(Error::translation(entity.clone(), reason.clone()));
        }
        let columns = self.projection::<D>();
        if columns.is_empty() {
            return Err(Error::translation(
                std::any::type_name::<D>(),
                "destination shares no column with the joined tables",
            ));
        }
        let base = &self.bindings[0];
        let mut sql = format!(
            "SELECT {} FROM {} {}",
            columns.join(", "),
            quote_ident(&base.descriptor.table),
            base.alias
        );
        for join in &self.joins {
            let bound = &self.bindings[join.binding];
            sql.push_str(&format!(
                " {} {} {}",
                join.kind.as_str(),
                quote_ident(&bound.descriptor.table),
                bound.alias
            ));
            if let Some(condition) = &join.condition {
                sql.push_str(" ON ");
                sql.push_str(condition);
            }
        }
        let mut conditions = self.filters.clone();
        if guard {
            conditions.extend(
                self.bindings
                    .iter()
                    .filter(|b| b.descriptor.soft_delete)
                    .map(|b| format!("{}.{} = 1", b.alias, ACTIVE_FLAG)),
            );
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        Ok(SqlFragment {
            sql,
            params: self.params.clone(),
        })
    }

    /// The statement as built, without soft-delete guards.
    pub fn select_sql<D: Record>(&self) -> Result<SqlFragment> {
        self.render::<D>(false)
    }

    /// The executable statement: explicit filters followed by a
    /// `<alias>.IsActive = 1` guard per soft-delete table. `None` when the
    /// plan is ignored.
    pub fn statement<D: Record>(&self) -> Result<Option<SqlFragment>> {
        if self.is_ignored() {
            return Ok(None);
        }
        let fragment = self.render::<D>(true)?;
        tracing::debug!(sql = %fragment.sql, params = fragment.params.len(), "Join statement");
        Ok(Some(fragment))
    }
}

/// Typed view of a [`JoinPlan`] positioned on the join `L` to `R`.
#[derive(Debug, Clone)]
pub struct JoinGraph<L, R> {
    plan: JoinPlan,
    _sides: PhantomData<fn() -> (L, R)>,
}

impl<L: Entity, R: Entity> JoinGraph<L, R> {
    /// Bind the base entity `L` and join `R` to it.
    pub fn start(
        registry: Arc<EntityRegistry>,
        options: CompileOptions,
        left_alias: &str,
        right_alias: &str,
        kind: JoinKind,
    ) -> Result<Self> {
        let mut plan = JoinPlan {
            registry,
            options,
            bindings: Vec::new(),
            joins: Vec::new(),
            filters: Vec::new(),
            params: Vec::new(),
            counter: 0,
            pins: Vec::new(),
            ignored: None,
            failure: None,
            left: 0,
            right: 0,
        };
        plan.left = plan.bind::<L>(left_alias)?;
        plan.right = plan.bind::<R>(right_alias)?;
        plan.joins.push(JoinClause {
            kind,
            binding: plan.right,
            condition: None,
        });
        Ok(Self::wrap(plan))
    }

    fn wrap(plan: JoinPlan) -> Self {
        Self {
            plan,
            _sides: PhantomData,
        }
    }

    /// Join on `L.key = R.other_key`.
    pub fn on(mut self, key: &str, other_key: &str) -> Self {
        if !self.plan.is_ignored() {
            if let Some(eq) = self.plan.equality(key, other_key) {
                if let Some(join) = self.plan.joins.last_mut() {
                    join.condition = Some(eq);
                }
            }
        }
        self
    }

    /// Extra `AND L.key = R.other_key` on the current join.
    pub fn and(mut self, key: &str, other_key: &str) -> Self {
        if !self.plan.is_ignored() {
            if let Some(eq) = self.plan.equality(key, other_key) {
                self.plan.add_condition(eq, Some("AND"));
            }
        }
        self
    }

    /// Extra `OR L.key = R.other_key` on the current join.
    pub fn or(mut self, key: &str, other_key: &str) -> Self {
        if !self.plan.is_ignored() {
            if let Some(eq) = self.plan.equality(key, other_key) {
                self.plan.add_condition(eq, Some("OR"));
            }
        }
        self
    }

    /// Filter the left side.
    pub fn where_first(mut self, filter: Filter<L>) -> Self {
        if !self.plan.is_ignored() {
            let binding = self.plan.left;
            self.plan.add_filter(binding, &filter);
        }
        self
    }

    /// Filter the right side.
    pub fn where_second(mut self, filter: Filter<R>) -> Self {
        if !self.plan.is_ignored() {
            let binding = self.plan.right;
            self.plan.add_filter(binding, &filter);
        }
        self
    }

    /// Project destination `property` from the latest binding of `E`,
    /// regardless of join order.
    pub fn pin<E: Entity>(mut self, property: &str) -> Self {
        if self.plan.is_ignored() {
            return self;
        }
        match self.plan.latest(TypeId::of::<E>()) {
            Some(binding) => self.plan.pins.push(Pin {
                binding,
                property: property.to_string(),
            }),
            None => tracing::warn!(
                entity = std::any::type_name::<E>(),
                property,
                "Pin ignored: entity is not part of the join"
            ),
        }
        self
    }

    /// Continue the chain with another join.
    pub fn then(self) -> JoinChain {
        JoinChain { plan: self.plan }
    }

    pub fn plan(&self) -> &JoinPlan {
        &self.plan
    }

    pub fn into_plan(self) -> JoinPlan {
        self.plan
    }

    pub fn select_sql<D: Record>(&self) -> Result<SqlFragment> {
        self.plan.select_sql::<D>()
    }

    pub fn statement<D: Record>(&self) -> Result<Option<SqlFragment>> {
        self.plan.statement::<D>()
    }
}

/// A join chain between two joins; pick the next join kind.
#[derive(Debug, Clone)]
pub struct JoinChain {
    plan: JoinPlan,
}

impl JoinChain {
    pub fn inner_join<L: Entity, R: Entity>(self, alias: &str) -> Result<JoinGraph<L, R>> {
        self.join::<L, R>(alias, JoinKind::Inner)
    }

    pub fn left_join<L: Entity, R: Entity>(self, alias: &str) -> Result<JoinGraph<L, R>> {
        self.join::<L, R>(alias, JoinKind::Left)
    }

    pub fn right_join<L: Entity, R: Entity>(self, alias: &str) -> Result<JoinGraph<L, R>> {
        self.join::<L, R>(alias, JoinKind::Right)
    }

    pub fn full_join<L: Entity, R: Entity>(self, alias: &str) -> Result<JoinGraph<L, R>> {
        self.join::<L, R>(alias, JoinKind::Full)
    }

    /// Join `R` to the latest binding of `L`.
    pub fn join<L: Entity, R: Entity>(
        mut self,
        alias: &str,
        kind: JoinKind,
    ) -> Result<JoinGraph<L, R>> {
        if self.plan.is_ignored() {
            return Ok(JoinGraph::wrap(self.plan));
        }
        let Some(left) = self.plan.latest(TypeId::of::<L>()) else {
            self.plan.ignore(format!(
                "{} is joined from {}, which is not bound earlier in the chain",
                R::TABLE,
                L::TABLE
            ));
            return Ok(JoinGraph::wrap(self.plan));
        };
        let right = self.plan.bind::<R>(alias)?;
        self.plan.left = left;
        self.plan.right = right;
        self.plan.joins.push(JoinClause {
            kind,
            binding: right,
            condition: None,
        });
        Ok(JoinGraph::wrap(self.plan))
    }
}
