//! The failure taxonomy delivered to callers.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Numeric codes for failures that carry no HTTP status.
pub mod codes {
    /// Unclassified failure.
    pub const UNKNOWN: i32 = 1000;
    /// The payload could not be parsed.
    pub const PARSE_ERROR: i32 = 1001;
    /// Connecting or reading timed out.
    pub const NETWORK_ERROR: i32 = 1002;
    /// HTTP-layer failure without a status (unknown host, payload mismatch).
    pub const HTTP_ERROR: i32 = 1003;
    /// TLS handshake or certificate failure.
    pub const SSL_ERROR: i32 = 1004;
}

/// The closed set of failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The server answered with a non-success HTTP status.
    HttpStatus,
    /// The server declared a failure inside a well-formed envelope.
    Business,
    /// The payload could not be parsed or did not have the declared shape.
    Parse,
    /// Connecting, resolving or reading failed.
    Connect,
    /// TLS handshake failure.
    Tls,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Returns a short stable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpStatus => "http_status",
            Self::Business => "business",
            Self::Parse => "parse",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ClassifiedError
// ============================================================================

/// A failure after classification: kind, code and a human-readable message.
///
/// Immutable once built. The message is never empty.
#[derive(Clone)]
pub struct ClassifiedError {
    kind: ErrorKind,
    code: i32,
    message: String,
    cause: Option<Arc<dyn Error + Send + Sync>>,
}

impl ClassifiedError {
    /// Creates a classified error.
    pub fn new(kind: ErrorKind, code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "request failed".to_string()
        } else {
            message
        };
        Self {
            kind,
            code,
            message,
            cause: None,
        }
    }

    /// Attaches the underlying failure.
    #[must_use]
    pub fn with_cause(mut self, cause: Arc<dyn Error + Send + Sync>) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Returns the failure class.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the HTTP status, server code or one of [`codes`].
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the underlying failure, if any.
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Debug for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifiedError")
            .field("kind", &self.kind)
            .field("code", &self.code)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(ToString::to_string))
            .finish()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_message_is_replaced() {
        let err = ClassifiedError::new(ErrorKind::Unknown, codes::UNKNOWN, "  ");
        assert!(!err.message().is_empty());
    }

    #[test]
    fn test_cause_is_exposed_as_source() {
        let io = std::io::Error::other("boom");
        let err = ClassifiedError::new(ErrorKind::Connect, codes::NETWORK_ERROR, "timed out")
            .with_cause(Arc::new(io));
        assert_eq!(err.source().map(ToString::to_string), Some("boom".to_string()));
        assert_eq!(err.to_string(), "timed out (code 1002)");
    }
}
