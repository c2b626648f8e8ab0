//! Result of a data-access call under the degrade-and-log policy.
//!
//! A failing SQL command does not abort the caller: the operation returns
//! its default value together with the error, which has already been
//! handed to the failure sink. Only fatal problems (unregistered entity,
//! strict translation failure, configuration) come back as `Err`.

use sqlentity_core::{Error, Result};

#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    /// The command failed; `value` is the operation's default.
    Degraded { value: T, error: Error },
    Err(Error),
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Outcome::Degraded { .. })
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Outcome::Err(_))
    }

    /// The error behind a degraded or failed outcome.
    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Degraded { error, .. } | Outcome::Err(error) => Some(error),
        }
    }

    /// Fail fast: degraded outcomes become errors.
    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Ok(value) => Ok(value),
            Outcome::Degraded { error, .. } | Outcome::Err(error) => Err(error),
        }
    }

    /// Keep the degraded default, fail only on fatal errors.
    pub fn into_value(self) -> Result<T> {
        match self {
            Outcome::Ok(value) | Outcome::Degraded { value, .. } => Ok(value),
            Outcome::Err(error) => Err(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::Degraded { value, error } => Outcome::Degraded {
                value: f(value),
                error,
            },
            Outcome::Err(error) => Outcome::Err(error),
        }
    }
}
