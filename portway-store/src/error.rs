//! Store error types.

use portway_core::CoreError;
use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted value could not be decoded.
    #[error("Corrupt entry {key}: {source}")]
    Corrupt {
        /// Key of the offending entry.
        key: String,
        /// Decoding failure.
        #[source]
        source: CoreError,
    },

    /// SQLite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    /// Returns true if this error came from the filesystem or database
    /// rather than from the stored data itself.
    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Database(_))
    }
}
