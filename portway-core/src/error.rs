//! Core error types for `Portway`.

use thiserror::Error;

/// Core error type for `Portway` model operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid data, e.g. a malformed persisted cookie.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Hex decoding of a persisted value failed.
    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
