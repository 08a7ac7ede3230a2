//! Error types for deskfind.
//!
//! Backend and record errors are contained at the adapter boundary: the
//! session logs them and carries on with fewer results. Only configuration
//! and index-management calls surface them to callers.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the deskfind engine.
#[derive(Debug, Error)]
pub enum SearchError {
    // Backend errors
    #[error("Failed to spawn {program}: {message}")]
    Spawn {
        program: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Backend error: {message}")]
    Backend { message: String },

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

    // Record errors
    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Search cancelled")]
    Cancelled,
}

/// Result type alias for deskfind operations.
pub type Result<T> = std::result::Result<T, SearchError>;

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(err: rusqlite::Error) -> Self {
        SearchError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SearchError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SearchError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a malformed-record error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        SearchError::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Whether this error comes from invoking a backend.
    ///
    /// Such errors turn a search step into an empty step; they never abort
    /// the remaining categories.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            SearchError::Spawn { .. }
                | SearchError::Backend { .. }
                | SearchError::Database { .. }
                | SearchError::Io { .. }
        )
    }
}
