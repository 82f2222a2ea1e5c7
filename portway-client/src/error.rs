//! Client error types.
//!
//! Two families live here:
//!
//! - [`ConfigError`]: a missing or invalid registration detected while
//!   building a client. Fatal for that build and never retried.
//! - [`CallError`]: the raw failure of one call, before classification.
//!   Callers normally see it only as a
//!   [`ClassifiedError`](portway_core::ClassifiedError).

use portway_core::BusinessFailure;
use thiserror::Error;

// ============================================================================
// Configuration Error
// ============================================================================

/// A configuration invariant was violated while building a client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No explicit, per-endpoint or global configuration was found.
    #[error("must register a network configuration for this endpoint before use: {base_url}")]
    NotRegistered {
        /// The endpoint that was requested.
        base_url: String,
    },

    /// The base URL is empty or not an absolute URL.
    #[error("invalid base URL {base_url:?}: {reason}")]
    InvalidBaseUrl {
        /// The offending value.
        base_url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Conversion was requested but no converter mode is configured.
    #[error("a converter mode is required when conversion is enabled")]
    MissingConverterMode,

    /// The converter mode needs a custom converter handle that was not supplied.
    #[error("converter mode {0} requires a custom converter")]
    MissingCustomConverter(String),

    /// Custom cookie persistence was selected without a store.
    #[error("cookie mode CUSTOM requires a custom cookie store")]
    MissingCustomCookieStore,

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader {
        /// Header name as configured.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The cookie backend could not be opened.
    #[error("cookie store unavailable: {0}")]
    CookieStore(String),

    /// The HTTP transport could not be built.
    #[error("transport construction failed: {0}")]
    Transport(String),
}

// ============================================================================
// Decode Error
// ============================================================================

/// A response body could not be converted into the requested type.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// JSON syntax or shape error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML syntax or shape error.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// The body was not valid UTF-8 text.
    #[error("body is not valid UTF-8")]
    NotText,

    /// The payload did not have the declared shape.
    #[error("payload mismatch: {0}")]
    Mismatch(String),

    /// A custom converter failed.
    #[error("converter error: {0}")]
    Custom(#[source] Box<dyn std::error::Error + Send + Sync>),
}

// ============================================================================
// Call Error
// ============================================================================

/// The raw failure of a single call.
#[derive(Debug, Error)]
pub enum CallError {
    /// Transport-level failure (connect, TLS, DNS, timeout, body read).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} {reason}")]
    Status {
        /// Status code.
        status: u16,
        /// Reason phrase.
        reason: String,
    },

    /// The body could not be converted.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The server declared a failure inside the envelope.
    #[error("business failure: {0}")]
    Business(#[from] BusinessFailure),

    /// The client could not be used for this call.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The request could not be built (bad path, bad body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other failure raised by a custom stage or transport.
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CallError {
    /// Wraps an arbitrary error.
    pub fn other(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(error.into())
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(DecodeError::Json(err))
    }
}
