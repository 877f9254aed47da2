//! Error types for the Noor offline core.
//!
//! Storage backends and the response cache surface these errors directly. The
//! storage janitor never returns them to its caller; it folds them into the
//! per-entry error list of a [`CleanupResult`](crate::janitor::CleanupResult).

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Noor core.
#[derive(Debug, Error)]
pub enum NoorError {
    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Key-value store errors
    #[error("Storage error for key '{key}': {message}")]
    Storage { key: String, message: String },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid build version: {0}")]
    InvalidVersion(String),

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Noor operations.
pub type Result<T> = std::result::Result<T, NoorError>;

impl From<std::io::Error> for NoorError {
    fn from(err: std::io::Error) -> Self {
        NoorError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for NoorError {
    fn from(err: serde_json::Error) -> Self {
        NoorError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for NoorError {
    fn from(err: rusqlite::Error) -> Self {
        NoorError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl NoorError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        NoorError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a storage error for a single key.
    pub fn storage(key: impl Into<String>, message: impl Into<String>) -> Self {
        NoorError::Storage {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Error raised when a mutex guarding a backend connection is poisoned.
    pub(crate) fn lock_poisoned(what: impl std::fmt::Display) -> Self {
        NoorError::Database {
            message: format!("Failed to lock database: {}", what),
            source: None,
        }
    }
}
