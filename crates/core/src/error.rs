use std::time::Duration;
use thiserror::Error;

use crate::dom::SelectorError;

/// Failures reported by a [`Driver`](crate::driver::Driver).
///
/// `Timeout` is the expected-absence class: the page simply did not render
/// what we waited for. Every other variant is a driver-level failure.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("`{locator}` not {condition} within {waited:?}")]
    Timeout {
        locator: String,
        condition: &'static str,
        waited: Duration,
    },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("browser session error: {0}")]
    Session(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("no element matches `{0}`")]
    NoSuchElement(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} is not supported by this driver")]
    Unsupported(&'static str),

    #[error(transparent)]
    InvalidSelector(#[from] SelectorError),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}

/// Failures persisting records or diagnostic snapshots.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
