//! Error types for azsnap
//!
//! Two families live here:
//!
//! - [`SnapError`]: run-level failures. Any of these aborts the whole batch
//!   (bad inventory, no Azure session, bad config, cannot write output).
//! - [`AzureError`]: the failure of a single Azure call for a single entity.
//!   These never abort a batch; they end up inside an operation outcome.

use std::path::PathBuf;
use thiserror::Error;

/// Run-level error, fatal for the batch
#[derive(Debug, Error)]
pub enum SnapError {
    /// Malformed inventory file
    #[error("Invalid input {}{}: {reason}", path.display(), line.map(|l| format!(" line {}", l)).unwrap_or_default())]
    InputFormat {
        path: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    /// Cannot establish an authenticated Azure session
    #[error("Azure login failed: {0}")]
    AzureLogin(String),

    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Results could not be persisted
    #[error("Failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapError {
    pub fn input(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        SnapError::InputFormat {
            path: path.into(),
            line: Some(line),
            reason: reason.into(),
        }
    }

    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapError::Output {
            path: path.into(),
            source,
        }
    }
}

/// Configuration error variants
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to load config from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    /// Configuration parsing error
    #[error("Failed to parse config '{path}': {reason}")]
    ParseError { path: String, reason: String },

    /// Invalid configuration value
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// How an Azure failure should be treated by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Throttling, network blips, 5xx: worth retrying
    Transient,
    /// The resource does not exist
    NotFound,
    /// Authentication or authorization was refused
    Unauthorized,
    /// Anything else the service rejected (bad request, conflict, ...)
    Permanent,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// A single failed Azure call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AzureError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AzureError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_mentions_line() {
        let err = SnapError::input("hosts.txt", 7, "expected a resource id");
        assert_eq!(
            err.to_string(),
            "Invalid input hosts.txt line 7: expected a resource id"
        );
    }

    #[test]
    fn test_input_error_without_line() {
        let err = SnapError::InputFormat {
            path: PathBuf::from("empty.txt"),
            line: None,
            reason: "no records".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid input empty.txt: no records");
    }

    #[test]
    fn test_only_transient_kind_is_retryable() {
        assert!(AzureError::transient("429").is_transient());
        assert!(!AzureError::not_found("gone").is_transient());
        assert!(!AzureError::unauthorized("denied").is_transient());
        assert!(!AzureError::permanent("bad request").is_transient());
    }
}
