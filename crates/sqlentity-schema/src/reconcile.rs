//! Reconciliation executor.
//!
//! Runs one planned pass against a connection: foreign keys are switched
//! off, every statement executes inside a single transaction, and the
//! previous foreign key setting is restored on every exit path. A failing
//! statement rolls the whole batch back.

use crate::diff::{MigrationPlan, PlanOptions, TableChange, plan_migration};
use crate::expected::target_snapshot;
use crate::introspect::live_snapshot;
use sqlentity_core::error::SchemaError;
use sqlentity_core::{
    Connection, DEFAULT_DATETIME_FORMAT, DataConfig, EntityRegistry, Error, Result,
    SchemaErrorKind, TransactionContext,
};

/// Reconciler settings.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Permit dropping or retyping live columns
    pub allow_destructive_migrations: bool,
    pub datetime_format: String,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            allow_destructive_migrations: false,
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
        }
    }
}

impl From<&DataConfig> for ReconcileOptions {
    fn from(config: &DataConfig) -> Self {
        Self {
            allow_destructive_migrations: config.allow_destructive_migrations,
            datetime_format: config.datetime_format.clone(),
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub rebuilt: Vec<String>,
    pub indexes_created: Vec<String>,
    pub indexes_dropped: Vec<String>,
    /// Destructive changes applied under `allow_destructive_migrations`
    pub warnings: Vec<String>,
    /// Every executed statement, in order
    pub statements: Vec<String>,
}

impl ReconcileReport {
    fn from_plan(plan: &MigrationPlan) -> Self {
        let mut report = Self {
            warnings: plan.warnings.clone(),
            statements: plan.statements(),
            ..Self::default()
        };
        for change in &plan.changes {
            match change {
                TableChange::Create(table) => {
                    report.created.push(table.name.clone());
                    report
                        .indexes_created
                        .extend(table.indexes.iter().map(|i| i.name.clone()));
                }
                TableChange::Rebuild { target, .. } => {
                    report.rebuilt.push(target.name.clone());
                    report
                        .indexes_created
                        .extend(target.indexes.iter().map(|i| i.name.clone()));
                }
                TableChange::Indexes { create, drop, .. } => {
                    report
                        .indexes_created
                        .extend(create.iter().map(|i| i.name.clone()));
                    report.indexes_dropped.extend(drop.iter().cloned());
                }
            }
        }
        report
    }

    /// True when the pass issued no DDL.
    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Brings a database in line with a registry.
pub struct Reconciler<'a> {
    registry: &'a EntityRegistry,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a EntityRegistry, options: ReconcileOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Compare the registry against the live schema without changing it.
    pub fn plan<C: Connection>(&self, conn: &C) -> Result<MigrationPlan> {
        let target = target_snapshot(self.registry)?;
        let live = live_snapshot(conn)?;
        plan_migration(
            &target,
            &live,
            &PlanOptions {
                allow_destructive: self.options.allow_destructive_migrations,
                datetime_format: self.options.datetime_format.clone(),
            },
        )
    }

    /// Plan and apply one pass.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub fn reconcile<C: Connection>(&self, conn: &C) -> Result<ReconcileReport> {
        let plan = self.plan(conn)?;
        let report = ReconcileReport::from_plan(&plan);
        if report.is_noop() {
            tracing::debug!("Schema up to date");
            return Ok(report);
        }

        let enforced = foreign_keys_enabled(conn)?;
        conn.execute_batch("PRAGMA foreign_keys = OFF")?;
        let applied = apply(conn, &report.statements);
        let restored = if enforced {
            conn.execute_batch("PRAGMA foreign_keys = ON")
        } else {
            Ok(())
        };
        applied?;
        restored?;

        tracing::info!(
            created = report.created.len(),
            rebuilt = report.rebuilt.len(),
            statements = report.statements.len(),
            "Schema reconciled"
        );
        Ok(report)
    }
}

fn foreign_keys_enabled<C: Connection>(conn: &C) -> Result<bool> {
    let row = conn.query_one("PRAGMA foreign_keys", &[])?;
    Ok(match row {
        Some(row) => row.get_as::<i64>(0)? != 0,
        None => false,
    })
}

fn apply<C: Connection>(conn: &C, statements: &[String]) -> Result<()> {
    let tx = TransactionContext::new(conn);
    for sql in statements {
        tracing::debug!(sql = %sql, "Executing DDL");
        if let Err(e) = tx.execute_batch(sql) {
            if let Err(rollback) = tx.rollback() {
                tracing::warn!(error = %rollback, "Rollback after failed DDL also failed");
            }
            return Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::Migration,
                message: format!(
                    "migration statement failed, the batch was rolled back and no changes were applied: {e}"
                ),
                source: Some(Box::new(e)),
            }));
        }
    }
    tx.commit()
}
