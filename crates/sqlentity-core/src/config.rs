//! Runtime configuration.

use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Default storage format for timestamp columns.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What the predicate compiler does with a shape it cannot render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationPolicy {
    /// Emit the always-false guard `1 != 1` and log the degeneracy.
    #[default]
    FailClosed,
    /// Return `Error::Translation`.
    Strict,
}

/// Configuration for a [`DataContext`](../sqlentity/struct.DataContext.html).
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes:
///
/// ```
/// use sqlentity_core::DataConfig;
///
/// let config = DataConfig::from_json_str(r#"{ "path": "app.db", "allow_destructive_migrations": true }"#).unwrap();
/// assert!(config.allow_destructive_migrations);
/// assert_eq!(config.busy_timeout_ms, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Database file path (":memory:" is accepted but every call gets a
    /// fresh, empty database).
    pub path: String,
    /// Busy timeout handed to the driver, in milliseconds
    pub busy_timeout_ms: u32,
    /// Allow reconciliation to drop live columns or change their type
    pub allow_destructive_migrations: bool,
    pub translation_policy: TranslationPolicy,
    /// chrono format string used to store and read timestamp columns
    pub datetime_format: String,
    /// Run `PRAGMA foreign_keys = ON` on every connection
    pub enforce_foreign_keys: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            busy_timeout_ms: 5000,
            allow_destructive_migrations: false,
            translation_policy: TranslationPolicy::FailClosed,
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
            enforce_foreign_keys: true,
        }
    }
}

impl DataConfig {
    /// Configuration for a database file.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Parse configuration from JSON. The datetime format is checked
    /// before the configuration is returned.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_datetime_format(&self.datetime_format)
    }

    pub fn allow_destructive_migrations(mut self, allow: bool) -> Self {
        self.allow_destructive_migrations = allow;
        self
    }

    pub fn translation_policy(mut self, policy: TranslationPolicy) -> Self {
        self.translation_policy = policy;
        self
    }

    pub fn datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = format.into();
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// 2001-02-03 04:05:06: every field distinct, so a swapped field shows up
/// when a rendered sample is parsed back.
fn reference_instant() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2001, 2, 3)
        .and_then(|d| d.and_hms_opt(4, 5, 6))
        .unwrap_or_default()
}

/// Render `at` in `format`. Fails with `Error::Config` when the format has
/// an unknown specifier or asks for fields a naive timestamp lacks.
pub fn format_datetime(at: &NaiveDateTime, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", at.format(format))
        .map_err(|_| Error::config(format!("invalid datetime format '{format}'")))?;
    Ok(out)
}

pub fn check_datetime_format(format: &str) -> Result<()> {
    format_datetime(&reference_instant(), format).map(drop)
}

/// Whether timestamps stored in `format` are text that SQLite's `date()`
/// and `julianday()` read back as the same instant.
pub fn is_iso_datetime_format(format: &str) -> bool {
    const TIME_FORMS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let sample = reference_instant();
    let Ok(text) = format_datetime(&sample, format) else {
        return false;
    };
    let same_minute = |p: &NaiveDateTime| {
        p.date() == sample.date() && p.hour() == sample.hour() && p.minute() == sample.minute()
    };
    TIME_FORMS.iter().any(|f| {
        NaiveDateTime::parse_from_str(&text, f).is_ok_and(|p| same_minute(&p))
    }) || NaiveDate::parse_from_str(&text, "%Y-%m-%d").is_ok_and(|d| d == sample.date())
}
