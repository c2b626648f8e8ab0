//! Core types and traits for sqlentity.
//!
//! - `Record` / `Entity` traits for struct <-> row mapping
//! - `EntityDescriptor` and `EntityRegistry`, the table metadata every
//!   other crate reads
//! - `Connection` trait and the scoped `TransactionContext`
//! - `Value`, `Row`, `Error`, configuration and failure reporting

pub mod config;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod identifiers;
pub mod log;
pub mod mapper;
pub mod model;
pub mod registry;
pub mod row;
pub mod transaction;
pub mod types;
pub mod value;

pub use config::{
    DEFAULT_DATETIME_FORMAT, DataConfig, TranslationPolicy, check_datetime_format, format_datetime,
    is_iso_datetime_format,
};
pub use connection::{Connection, SqlParam};
pub use descriptor::{
    ColumnDescriptor, DescriptorBuilder, EntityDescriptor, ForeignKeySpec, IndexSpec,
};
pub use error::{Error, Result, SchemaErrorKind, TransactionErrorKind};
pub use field::{ACTIVE_FLAG, FieldSpec, PRIMARY_KEY, ReferentialAction};
pub use identifiers::{is_valid_identifier, quote_ident, quote_literal};
pub use log::{ChannelSink, FailureEvent, FailureSink, TracingSink};
pub use mapper::RowMapper;
pub use model::{Entity, EntityRef, Record};
pub use registry::{EntityRegistry, EntityRelations, RegistryBuilder, RelationConfig};
pub use row::{ColumnInfo, FromValue, Row};
pub use transaction::{TransactionContext, TransactionState};
pub use types::ColumnType;
pub use value::Value;
