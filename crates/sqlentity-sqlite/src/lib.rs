//! SQLite driver for sqlentity.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Implements the synchronous `Connection` trait from sqlentity-core over
//! `libsqlite3-sys` (bundled amalgamation).
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlentity_core::{Connection, SqlParam};
//! use sqlentity_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE Person (Id INTEGER PRIMARY KEY, Name TEXT)")?;
//! let id = conn.insert(
//!     "INSERT INTO Person (Name) VALUES (@Name0)",
//!     &[SqlParam::new("Name0", "Alice")],
//! )?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite storage |
//! |-------|----------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int` | INTEGER |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Uuid` | TEXT (hyphenated) |
//! | `Timestamp` | TEXT (configured format) |
//! | `Null` | NULL |

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

use sqlentity_core::DataConfig;

impl From<&DataConfig> for SqliteConfig {
    fn from(config: &DataConfig) -> Self {
        SqliteConfig::file(config.path.clone())
            .busy_timeout(config.busy_timeout_ms)
            .datetime_format(config.datetime_format.clone())
            .foreign_keys(config.enforce_foreign_keys)
    }
}

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Version number of the linked SQLite library.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_reported() {
        assert!(sqlite_version().starts_with('3'));
        assert!(sqlite_version_number() >= 3_000_000);
    }

    #[test]
    fn data_config_carries_over() {
        let data = DataConfig::file("app.db")
            .busy_timeout(250)
            .datetime_format("%d.%m.%Y");
        let config = SqliteConfig::from(&data);
        assert_eq!(config.path, "app.db");
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.datetime_format, "%d.%m.%Y");
        assert!(config.foreign_keys);
    }
}
