//! sqlentity - typed entities over SQLite.
//!
//! - Entities implement [`Record`] and [`Entity`] and are registered once in
//!   an [`EntityRegistry`]
//! - [`Col`] and [`Filter`] build predicates that compile to parameterized
//!   SQL, failing closed when a shape cannot be translated
//! - [`DataContext::join`] composes multi-table joins projected onto any
//!   [`Record`]; [`DataContext::include`] describes eager-loaded graphs
//! - [`DataContext::reconcile`] creates and migrates tables without losing
//!   data, refusing destructive changes unless explicitly allowed
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlentity::prelude::*;
//!
//! let registry = EntityRegistry::builder()
//!     .register::<Blog>()
//!     .register::<Post>()
//!     .build()?;
//! let db = DataContext::new(registry, DataConfig::file("blog.db"));
//! db.reconcile()?;
//!
//! let mut blog = Blog { title: "Notes".into(), ..Blog::default() };
//! db.insert(&mut blog).into_result()?;
//!
//! let recent = db.fetch(&Col::<Blog>::new("Title").starts_with("N")).into_result()?;
//!
//! let scope = db.transaction()?;
//! scope.delete(&blog);
//! scope.commit()?;
//! ```
//!
//! Data-access calls return an [`Outcome`]: SQL command failures are logged
//! to the configured [`FailureSink`] and degrade to a default value, while
//! configuration and strict translation errors are returned as `Err`.

pub mod access;
pub mod context;
pub mod materialize;
pub mod outcome;

pub use access::{DataAccess, Session};
pub use context::{DataContext, TransactionScope};
pub use materialize::IdentityMap;
pub use outcome::Outcome;

pub use sqlentity_core::{
    ChannelSink, ColumnType, Connection, DataConfig, DescriptorBuilder, Entity, EntityDescriptor,
    EntityRef, EntityRegistry, Error, FailureEvent, FailureSink, FieldSpec, FromValue, Record,
    ReferentialAction, RelationConfig, Result, Row, SchemaErrorKind, SqlParam, TracingSink,
    TransactionContext, TransactionErrorKind, TransactionState, TranslationPolicy, Value,
};
pub use sqlentity_query::{
    Col, CompareOp, Filter, IncludePlan, JoinGraph, JoinKind, SqlFragment, StoredView, ViewStore,
};
pub use sqlentity_schema::{MigrationPlan, ReconcileOptions, ReconcileReport, SchemaSnapshot};
pub use sqlentity_sqlite::{SqliteConfig, SqliteConnection};

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::{
        Col, ColumnType, DataAccess, DataConfig, DataContext, DescriptorBuilder, Entity,
        EntityRef, EntityRegistry, Error, FieldSpec, Filter, FromValue, IncludePlan, JoinKind,
        Outcome, Record, ReferentialAction, Result, Session, TransactionScope, Value,
    };
}
