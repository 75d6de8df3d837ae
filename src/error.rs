//! Centralized error types for mailtriage.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailtriage library.
#[derive(Error, Debug)]
pub enum TriageError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The rule document is not valid JSON (or does not have the expected shape).
    #[error("Cannot parse rule document '{path}': {source}")]
    RulesSyntax {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The rule document parsed but describes something we cannot run.
    #[error("Invalid rule document at {location}: {reason}")]
    InvalidRules { location: String, reason: String },

    /// A record's date could not be converted to a timestamp.
    #[error("Cannot parse date '{value}': {reason}")]
    DateParse { value: String, reason: String },

    /// A mail provider call failed.
    #[error("Mail provider error during {operation}: {reason}")]
    Provider { operation: String, reason: String },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication could not be completed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The store file is corrupt or was written by an incompatible version.
    #[error("Corrupt or incompatible record store '{path}': {reason}")]
    InvalidStore { path: PathBuf, reason: String },
}

/// Convenience alias for `Result<T, TriageError>`.
pub type Result<T> = std::result::Result<T, TriageError>;

impl TriageError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Provider` variant for the named operation.
    pub fn provider(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an `InvalidRules` variant.
    pub fn invalid_rules(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRules {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `TriageError::io`).
impl From<std::io::Error> for TriageError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
