//! Schema reconciliation for sqlentity.
//!
//! This crate provides:
//! - Target schema extraction from registered entity descriptors
//! - Live schema introspection through SQLite's catalog pragmas
//! - A diff engine producing an ordered migration plan
//! - SQLite DDL generation, including table rebuilds
//! - The reconciler, which applies a plan as one rolled-back-on-failure batch
//!
//! Destructive changes (dropped or retyped columns) are refused unless
//! `allow_destructive_migrations` is set. Making a nullable foreign key
//! column required is refused outright.

pub mod ddl;
pub mod diff;
pub mod expected;
pub mod introspect;
pub mod reconcile;
pub mod snapshot;

#[cfg(test)]
mod fixtures;

pub use diff::{ColumnCopy, MigrationPlan, PlanOptions, TableChange, backfill, plan_migration};
pub use expected::{fk_constraint_name, index_name, target_snapshot, unique_constraint_name};
pub use introspect::live_snapshot;
pub use reconcile::{ReconcileOptions, ReconcileReport, Reconciler};
pub use snapshot::{
    ColumnSnapshot, ForeignKeySnapshot, IndexSnapshot, SchemaSnapshot, TableSnapshot,
    UniqueSnapshot, normalize_sql_type,
};
