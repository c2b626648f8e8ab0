//! The data context and its transaction scopes.
//!
//! A [`DataContext`] owns the entity registry, configuration and failure
//! sink that every operation reads. Calls made on the context itself open
//! a connection per call; a [`TransactionScope`] threads one connection and
//! one transaction through many calls.

use crate::access::Session;
use sqlentity_core::{
    Connection, DataConfig, Entity, EntityRegistry, FailureEvent, FailureSink, Result,
    TracingSink, TransactionContext, TransactionState,
};
use sqlentity_query::{CompileOptions, IncludePlan, JoinGraph, JoinKind};
use sqlentity_schema::{MigrationPlan, ReconcileOptions, ReconcileReport, Reconciler};
use sqlentity_sqlite::{SqliteConfig, SqliteConnection};
use std::fmt;
use std::sync::Arc;

/// Registry, configuration and failure reporting for one database.
pub struct DataContext {
    registry: Arc<EntityRegistry>,
    config: DataConfig,
    sink: Arc<dyn FailureSink>,
}

impl fmt::Debug for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContext")
            .field("entities", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DataContext {
    /// Failures are reported through [`TracingSink`] until
    /// [`with_sink`](Self::with_sink) replaces it.
    pub fn new(registry: EntityRegistry, config: DataConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn FailureSink> {
        &self.sink
    }

    /// Name under which join views for this database are stored.
    pub fn source(&self) -> &str {
        &self.config.path
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions::new(self.config.translation_policy)
            .with_sink(Arc::clone(&self.sink))
            .datetime_format(&self.config.datetime_format)
    }

    /// Open a fresh connection with the context's settings.
    pub fn connect(&self) -> Result<SqliteConnection> {
        SqliteConnection::open(&SqliteConfig::from(&self.config))
    }

    /// Begin a scope sharing one connection and one lazily-begun
    /// transaction.
    pub fn transaction(&self) -> Result<TransactionScope<'_>> {
        Ok(TransactionScope {
            context: self,
            tx: TransactionContext::new(self.connect()?),
        })
    }

    /// Plan a reconciliation pass without applying it.
    pub fn plan_schema(&self) -> Result<MigrationPlan> {
        let conn = self.connect()?;
        Reconciler::new(&self.registry, ReconcileOptions::from(&self.config)).plan(&conn)
    }

    /// Bring the database schema in line with the registry. Failures are
    /// reported to the sink as well as returned.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let conn = self.connect()?;
        Reconciler::new(&self.registry, ReconcileOptions::from(&self.config))
            .reconcile(&conn)
            .inspect_err(|e| {
                let event =
                    FailureEvent::new("reconcile", e.to_string()).context(&self.config.path);
                self.sink.record(event);
            })
    }

    /// Start a join graph of `L` and `R` with the context's compile
    /// options.
    pub fn join<L: Entity, R: Entity>(
        &self,
        left_alias: &str,
        right_alias: &str,
        kind: JoinKind,
    ) -> Result<JoinGraph<L, R>> {
        JoinGraph::start(
            Arc::clone(&self.registry),
            self.compile_options(),
            left_alias,
            right_alias,
            kind,
        )
    }

    /// Start an eager-load plan rooted at `R`.
    pub fn include<R: Entity>(&self) -> Result<IncludePlan<R>> {
        IncludePlan::new(&self.registry)
    }
}

impl Session for DataContext {
    fn context(&self) -> &DataContext {
        self
    }

    fn with_connection<T>(&self, f: impl FnOnce(&dyn Connection) -> Result<T>) -> Result<T> {
        let conn = self.connect()?;
        f(&conn)
    }
}

/// One connection and one transaction shared by every call made through
/// the scope.
///
/// Dropping the scope commits unless a call failed or
/// [`mark_do_not_commit`](Self::mark_do_not_commit) was called, in which
/// case everything rolls back.
pub struct TransactionScope<'c> {
    context: &'c DataContext,
    tx: TransactionContext<SqliteConnection>,
}

impl fmt::Debug for TransactionScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("state", &self.tx.state())
            .field("begun", &self.tx.has_begun())
            .finish_non_exhaustive()
    }
}

impl TransactionScope<'_> {
    pub fn state(&self) -> TransactionState {
        self.tx.state()
    }

    pub fn is_faulted(&self) -> bool {
        self.tx.is_faulted()
    }

    /// Roll back at scope exit even if every call succeeds.
    pub fn mark_do_not_commit(&self) {
        self.tx.mark_do_not_commit();
    }

    /// Commit now. A faulted scope rolls back and returns an error.
    pub fn commit(self) -> Result<()> {
        self.tx.commit()
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()
    }
}

impl Session for TransactionScope<'_> {
    fn context(&self) -> &DataContext {
        self.context
    }

    fn with_connection<T>(&self, f: impl FnOnce(&dyn Connection) -> Result<T>) -> Result<T> {
        f(&self.tx)
    }

    fn fault(&self) {
        self.tx.mark_faulted();
    }
}
