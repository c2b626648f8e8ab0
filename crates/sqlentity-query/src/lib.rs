//! Query construction for sqlentity.
//!
//! `sqlentity-query` turns typed predicates and relationship descriptions
//! into SQL text plus named parameters. Nothing here touches a connection;
//! the `sqlentity` facade executes what these builders render.
//!
//! # Role In The Architecture
//!
//! - **Predicates**: [`Col`] and [`Filter`] build a tree that
//!   [`PredicateCompiler`] renders against an entity's descriptor, with
//!   parameters named `@<Column><N>`.
//! - **Helper functions**: a fixed table of SQL templates (`like`,
//!   `same_day`, `round`, ...) with optional client-side evaluators used to
//!   fold calls that reference no column.
//! - **Joins**: [`JoinGraph`] accumulates aliases, join conditions and
//!   per-side filters into a [`JoinPlan`], which projects onto a
//!   destination shape; [`ViewStore`] keeps rendered plans for reuse.
//! - **Eager loading**: [`IncludePlan`] describes the navigations loaded
//!   alongside a root query as one `LEFT JOIN` statement.
//!
//! Predicates that cannot be expressed in SQL fail closed to `1 != 1`
//! unless [`TranslationPolicy::Strict`](sqlentity_core::TranslationPolicy)
//! is configured.

pub mod compile;
pub mod eager;
pub mod functions;
pub mod join;
pub mod predicate;
pub mod view;

#[cfg(test)]
mod fixtures;

pub use compile::{
    ALWAYS_FALSE, ALWAYS_TRUE, CompileOptions, PredicateCompiler, SqlFragment, compile,
};
pub use eager::{
    Cardinality, IncludePlan, IncludeStep, NodeCodec, NodeDecoder, ROOT_ALIAS, SharedEntity,
    downcast,
};
pub use functions::{ArgKind, FunctionTemplate};
pub use join::{Binding, JoinChain, JoinGraph, JoinKind, JoinPlan};
pub use predicate::{Col, CompareOp, Computed, Filter, FunctionCall, Logic, Node, Operand};
pub use view::{StoredView, ViewStore};
