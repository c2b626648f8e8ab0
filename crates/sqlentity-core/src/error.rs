//! Error types for sqlentity operations.

use std::fmt;

/// The primary error type for all sqlentity operations.
#[derive(Debug)]
pub enum Error {
    /// Opening or closing a database handle failed
    Connection(ConnectionError),
    /// Statement preparation or execution failed
    Query(QueryError),
    /// Value conversion failed
    Type(TypeError),
    /// Transaction state errors
    Transaction(TransactionError),
    /// Schema planning and migration errors
    Schema(SchemaError),
    /// Entity registration and configuration errors
    Config(ConfigError),
    /// A predicate could not be translated to SQL
    Translation(TranslationError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// The handle was already closed
    Disconnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, not null)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Database is busy or locked
    Busy,
    /// Statement was interrupted
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Already committed
    AlreadyCommitted,
    /// Already rolled back
    AlreadyRolledBack,
    /// A statement inside the transaction failed, so it was rolled back
    Faulted,
    /// Nested transaction not supported
    NestedNotSupported,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// A live column or type would be dropped without the force flag
    DestructiveMigrationBlocked,
    /// A declared column type has no SQLite mapping
    UnsupportedColumnType,
    /// A nullable column cannot become non-nullable safely
    TighteningRejected,
    /// Invalid schema definition
    Invalid,
    /// DDL execution failed; the batch was rolled back
    Migration,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// A predicate shape the compiler cannot render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationError {
    /// Entity (table) the predicate was written against
    pub entity: String,
    /// What was unsupported
    pub reason: String,
}

impl Error {
    /// Is this a transient failure worth retrying (busy/locked database)?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Query(q) if q.kind == QueryErrorKind::Busy)
    }

    /// Is this a failure of a single SQL command (as opposed to a fatal
    /// configuration or translation problem)?
    pub fn is_command_failure(&self) -> bool {
        matches!(
            self,
            Error::Query(_) | Error::Type(_) | Error::Connection(_) | Error::Transaction(_)
        )
    }

    /// Get the schema error kind, if this is a schema error.
    pub fn schema_kind(&self) -> Option<SchemaErrorKind> {
        match self {
            Error::Schema(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Build a schema error of the given kind.
    pub fn schema(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Build a translation error.
    pub fn translation(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Translation(TranslationError {
            entity: entity.into(),
            reason: reason.into(),
        })
    }
}

impl QueryError {
    /// Is this a constraint violation (unique, foreign key, not null)?
    pub fn is_constraint_violation(&self) -> bool {
        self.kind == QueryErrorKind::Constraint
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Translation(e) => write!(f, "Translation error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Schema(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "{} (in `{}`)", self.message, sql),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (predicate on {})", self.reason, self.entity)
    }
}

impl std::error::Error for ConnectionError {}
impl std::error::Error for QueryError {}
impl std::error::Error for TypeError {}
impl std::error::Error for TransactionError {}
impl std::error::Error for SchemaError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for TranslationError {}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<TranslationError> for Error {
    fn from(err: TranslationError) -> Self {
        Error::Translation(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for sqlentity operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_query_is_retryable() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Busy,
            sql: None,
            message: "database is locked".to_string(),
            source: None,
        });
        assert!(err.is_retryable());
        assert!(err.is_command_failure());
    }

    #[test]
    fn schema_errors_are_not_command_failures() {
        let err = Error::schema(SchemaErrorKind::DestructiveMigrationBlocked, "drop Age");
        assert!(!err.is_command_failure());
        assert_eq!(
            err.schema_kind(),
            Some(SchemaErrorKind::DestructiveMigrationBlocked)
        );
        assert_eq!(err.to_string(), "Schema error: drop Age");
    }

    #[test]
    fn query_error_display_includes_sql() {
        let err = QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some("SELEC 1".to_string()),
            message: "near \"SELEC\": syntax error".to_string(),
            source: None,
        };
        assert_eq!(
            err.to_string(),
            "near \"SELEC\": syntax error (in `SELEC 1`)"
        );
    }

    #[test]
    fn translation_error_display() {
        let err = Error::translation("Person", "unknown column 'Agee'");
        assert_eq!(
            err.to_string(),
            "Translation error: unknown column 'Agee' (predicate on Person)"
        );
    }
}
