//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing the `Connection` trait
//! from sqlentity-core. Parameters are bound by name
//! (`sqlite3_bind_parameter_index`), so `@Age0` in the SQL text pairs
//! with `SqlParam { name: "Age0", .. }` regardless of order.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::types;
use sqlentity_core::{
    Connection, DEFAULT_DATETIME_FORMAT, Error, Row, SqlParam, check_datetime_format,
    error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind},
    row::ColumnInfo,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// chrono format used when binding timestamps.
    pub datetime_format: String,
    /// Run `PRAGMA foreign_keys = ON` after opening.
    pub foreign_keys: bool,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Set the timestamp storage format.
    pub fn datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = format.into();
        self
    }

    /// Enable or disable foreign key enforcement.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

/// Inner state of the SQLite connection, protected by a mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the handle is only touched while holding the Mutex.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
///
/// `Send + Sync` through an internal mutex. The mutex is held while a
/// `query_each` callback runs, so the callback must not issue statements
/// on the same connection.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
    datetime_format: String,
}

/// Finalizes its statement on drop.
struct Statement(*mut ffi::sqlite3_stmt);

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: the pointer came from sqlite3_prepare_v2; finalize accepts null
        unsafe {
            ffi::sqlite3_finalize(self.0);
        }
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    ///
    /// Fails with `Error::Config` before touching the database when the
    /// datetime format cannot render a timestamp.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        check_datetime_format(&config.datetime_format)?;
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = CStr::from_ptr(ffi::sqlite3_errmsg(db))
                        .to_string_lossy()
                        .into_owned();
                    ffi::sqlite3_close(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database '{}': {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        let conn = Self {
            inner: Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
            datetime_format: config.datetime_format.clone(),
        };
        if config.foreign_keys {
            conn.execute_raw("PRAGMA foreign_keys = ON")?;
        }
        tracing::trace!(path = %config.path, "SQLite connection opened");
        Ok(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute SQL directly without preparing (DDL, PRAGMA, several
    /// statements separated by `;`).
    pub fn execute_raw(&self, sql: &str) -> Result<(), Error> {
        let inner = self.lock();
        let c_sql = CString::new(sql).map_err(|_| null_byte(sql))?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is valid and owned by us until freed
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };

            return Err(Error::Query(QueryError {
                kind: error_code_to_kind(rc),
                sql: Some(sql.to_string()),
                message: msg,
                source: None,
            }));
        }

        Ok(())
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> i32 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(inner.db) }
    }

    /// Whether an explicit transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }

    fn prepare_bound(
        &self,
        db: *mut ffi::sqlite3,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Statement, Error> {
        let stmt = prepare_stmt(db, sql)?;
        for param in params {
            let c_name = CString::new(format!("@{}", param.name)).map_err(|_| null_byte(sql))?;
            // SAFETY: stmt is valid, name is NUL-terminated
            let index = unsafe { ffi::sqlite3_bind_parameter_index(stmt.0, c_name.as_ptr()) };
            if index == 0 {
                return Err(Error::Query(QueryError {
                    kind: QueryErrorKind::Syntax,
                    sql: Some(sql.to_string()),
                    message: format!("statement has no parameter named @{}", param.name),
                    source: None,
                }));
            }
            // SAFETY: stmt is valid, index is 1-based and in range
            let rc =
                unsafe { types::bind_value(stmt.0, index, &param.value, &self.datetime_format) };
            if rc != ffi::SQLITE_OK {
                return Err(bind_error(db, sql, &param.name));
            }
        }
        Ok(stmt)
    }

    fn step_done(&self, sql: &str, params: &[SqlParam]) -> Result<(u64, i64), Error> {
        let inner = self.lock();
        let stmt = self.prepare_bound(inner.db, sql, params)?;

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt.0) };
        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let (changes, rowid) = unsafe {
                    (
                        ffi::sqlite3_changes(inner.db),
                        ffi::sqlite3_last_insert_rowid(inner.db),
                    )
                };
                Ok((changes.max(0) as u64, rowid))
            }
            _ => Err(step_error(inner.db, sql)),
        }
    }

    fn set_transaction(&self, sql: &'static str, open: bool) -> Result<(), Error> {
        if self.in_transaction() == open {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: Some(sql.to_string()),
                message: if open {
                    "Already in a transaction".to_string()
                } else {
                    "Not in a transaction".to_string()
                },
                source: None,
            }));
        }
        self.execute_raw(sql)?;
        self.lock().in_transaction = open;
        tracing::trace!(statement = sql, "Transaction state changed");
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid and no statements outlive the connection
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn query_each(
        &self,
        sql: &str,
        params: &[SqlParam],
        on_row: &mut dyn FnMut(&Row) -> sqlentity_core::Result<()>,
    ) -> Result<(), Error> {
        tracing::trace!(sql = sql, params = params.len(), "query");
        let inner = self.lock();
        let stmt = self.prepare_bound(inner.db, sql, params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.0) };
        let names = (0..col_count)
            // SAFETY: stmt is valid, i is in range
            .map(|i| unsafe { types::column_name(stmt.0, i) }.unwrap_or_else(|| format!("col{i}")))
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(stmt.0) };
            match rc {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: stmt just returned SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt.0, i) })
                        .collect();
                    on_row(&Row::with_columns(Arc::clone(&columns), values))?;
                }
                ffi::SQLITE_DONE => return Ok(()),
                _ => return Err(step_error(inner.db, sql)),
            }
        }
    }

    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64, Error> {
        tracing::trace!(sql = sql, params = params.len(), "execute");
        self.step_done(sql, params).map(|(changes, _)| changes)
    }

    fn insert(&self, sql: &str, params: &[SqlParam]) -> Result<i64, Error> {
        tracing::trace!(sql = sql, params = params.len(), "insert");
        self.step_done(sql, params).map(|(_, rowid)| rowid)
    }

    fn execute_batch(&self, sql: &str) -> Result<(), Error> {
        self.execute_raw(sql)
    }

    fn begin(&self) -> Result<(), Error> {
        self.set_transaction("BEGIN IMMEDIATE", true)
    }

    fn commit(&self) -> Result<(), Error> {
        self.set_transaction("COMMIT", false)
    }

    fn rollback(&self) -> Result<(), Error> {
        self.set_transaction("ROLLBACK", false)
    }
}

fn null_byte(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
        source: None,
    })
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<Statement, Error> {
    let c_sql = CString::new(sql).map_err(|_| null_byte(sql))?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        return Err(db_error(db, sql, "prepare"));
    }

    Ok(Statement(stmt))
}

fn db_error(db: *mut ffi::sqlite3, sql: &str, phase: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe {
        (
            CStr::from_ptr(ffi::sqlite3_errmsg(db))
                .to_string_lossy()
                .into_owned(),
            ffi::sqlite3_errcode(db),
        )
    };
    tracing::debug!(phase, code, error = %msg, "SQLite error");
    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        message: msg,
        source: None,
    })
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param: &str) -> Error {
    match db_error(db, sql, "bind") {
        Error::Query(mut q) => {
            q.message = format!("Failed to bind @{}: {}", param, q.message);
            Error::Query(q)
        }
        other => other,
    }
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    db_error(db, sql, "step")
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}
