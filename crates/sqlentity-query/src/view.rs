//! Stored join plans.
//!
//! A view is a join plan rendered once for a destination shape and kept
//! under `(destination, source database)` so repeated executions skip
//! rebuilding and recompiling the graph.

use crate::compile::SqlFragment;
use crate::join::{JoinGraph, JoinPlan};
use sqlentity_core::{Entity, Record, Result};
use std::any::TypeId;
use std::collections::HashMap;

/// A join plan plus its rendered statement.
#[derive(Debug, Clone)]
pub struct StoredView {
    pub destination: &'static str,
    pub source: String,
    plan: JoinPlan,
    statement: Option<SqlFragment>,
}

impl StoredView {
    /// The statement to execute; `None` for an ignored plan.
    pub fn statement(&self) -> Option<&SqlFragment> {
        self.statement.as_ref()
    }

    pub fn plan(&self) -> &JoinPlan {
        &self.plan
    }
}

#[derive(Debug, Default)]
pub struct ViewStore {
    views: HashMap<(TypeId, String), StoredView>,
}

impl ViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `plan` for `D` and keep it, replacing any previous view for
    /// the same key.
    pub fn store<D: Record>(&mut self, source: &str, plan: JoinPlan) -> Result<&StoredView> {
        let statement = plan.statement::<D>()?;
        let view = StoredView {
            destination: std::any::type_name::<D>(),
            source: source.to_string(),
            plan,
            statement,
        };
        tracing::debug!(
            destination = view.destination,
            source,
            "Join view stored"
        );
        let key = (TypeId::of::<D>(), source.to_string());
        self.views.insert(key.clone(), view);
        Ok(&self.views[&key])
    }

    pub fn get<D: Record>(&self, source: &str) -> Option<&StoredView> {
        self.views.get(&(TypeId::of::<D>(), source.to_string()))
    }

    pub fn remove<D: Record>(&mut self, source: &str) -> Option<StoredView> {
        self.views.remove(&(TypeId::of::<D>(), source.to_string()))
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

impl<L: Entity, R: Entity> JoinGraph<L, R> {
    /// Persist this graph as the view for destination `D` on `source`.
    pub fn store_as_view<'v, D: Record>(
        self,
        views: &'v mut ViewStore,
        source: &str,
    ) -> Result<&'v StoredView> {
        views.store::<D>(source, self.into_plan())
    }
}
