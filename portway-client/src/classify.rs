//! Failure classification.
//!
//! Every raw [`CallError`] maps to exactly one [`ClassifiedError`]. The
//! mapping is total and deterministic; the raw error is kept as the cause.
//!
//! ## Precedence
//!
//! 1. Non-success HTTP status → [`ErrorKind::HttpStatus`], code = status
//! 2. Server-declared business failure → passed through
//! 3. Malformed payload → [`ErrorKind::Parse`]
//! 4. Connect, timeout or socket failure → [`ErrorKind::Connect`]
//! 5. TLS failure → [`ErrorKind::Tls`]
//! 6. Unknown host → [`ErrorKind::Connect`] with [`codes::HTTP_ERROR`]
//! 7. Payload shape mismatch → [`ErrorKind::Parse`] with [`codes::HTTP_ERROR`]
//! 8. Anything else → [`ErrorKind::Unknown`]
//!
//! Transport errors are inspected TLS first, then DNS, then connect, since a
//! failed handshake or lookup also reports itself as a connect failure.

use std::error::Error as StdError;
use std::sync::Arc;

use portway_core::{ClassifiedError, ErrorKind, codes};

use crate::error::{CallError, DecodeError};

const PARSE_MESSAGE: &str = "data parsing error";
const CONNECT_MESSAGE: &str = "connection timed out, check network";
const TLS_MESSAGE: &str = "certificate verification failed";
const UNKNOWN_HOST_MESSAGE: &str = "network unavailable";
const MISMATCH_MESSAGE: &str = "request failed, payload mismatch";
const UNKNOWN_MESSAGE: &str = "request failed";

const TLS_MARKERS: &[&str] = &["certificate", "tls", "ssl", "handshake"];
const DNS_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "no such host",
    "nodename nor servname",
];

/// Maps raw call failures onto the caller-facing taxonomy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classifies `error`.
    pub fn classify(error: CallError) -> ClassifiedError {
        let (kind, code, message) = Self::describe(&error);
        ClassifiedError::new(kind, code, message).with_cause(Arc::new(error))
    }

    /// Returns the message shown for an HTTP status failure.
    pub fn status_message(status: u16) -> &'static str {
        match status {
            400 => "request malformed",
            401 => "unauthenticated, please sign in",
            403 => "access forbidden",
            404 => "resource not found",
            408 | 504 => "server timed out",
            500 => "internal server error",
            502 => "bad gateway",
            503 => "service unavailable",
            505 => "HTTP version not supported",
            _ => "network error",
        }
    }

    fn describe(error: &CallError) -> (ErrorKind, i32, String) {
        match error {
            CallError::Status { status, .. } => (
                ErrorKind::HttpStatus,
                i32::from(*status),
                Self::status_message(*status).to_string(),
            ),
            CallError::Business(failure) => (ErrorKind::Business, failure.code, failure.msg.clone()),
            CallError::Decode(decode) => {
                let (code, message) = Self::describe_decode(decode);
                (ErrorKind::Parse, code, message.to_string())
            }
            CallError::Transport(e) => {
                let (kind, code, message) = Self::describe_transport(e);
                (kind, code, message.to_string())
            }
            CallError::Config(_) | CallError::InvalidRequest(_) | CallError::Other(_) => {
                (ErrorKind::Unknown, codes::UNKNOWN, UNKNOWN_MESSAGE.to_string())
            }
        }
    }

    fn describe_decode(error: &DecodeError) -> (i32, &'static str) {
        match error {
            DecodeError::Json(e) if e.is_data() => (codes::HTTP_ERROR, MISMATCH_MESSAGE),
            DecodeError::Mismatch(_) => (codes::HTTP_ERROR, MISMATCH_MESSAGE),
            DecodeError::Json(_) | DecodeError::Xml(_) | DecodeError::NotText | DecodeError::Custom(_) => {
                (codes::PARSE_ERROR, PARSE_MESSAGE)
            }
        }
    }

    fn describe_transport(error: &reqwest::Error) -> (ErrorKind, i32, &'static str) {
        // The top-level message embeds the URL, so only the causes are searched.
        if chain_mentions(error.source(), TLS_MARKERS) {
            return (ErrorKind::Tls, codes::SSL_ERROR, TLS_MESSAGE);
        }
        if chain_mentions(error.source(), DNS_MARKERS) {
            return (ErrorKind::Connect, codes::HTTP_ERROR, UNKNOWN_HOST_MESSAGE);
        }
        if error.is_connect() || error.is_timeout() || has_socket_error(error) {
            return (ErrorKind::Connect, codes::NETWORK_ERROR, CONNECT_MESSAGE);
        }
        if error.is_decode() {
            return (ErrorKind::Parse, codes::PARSE_ERROR, PARSE_MESSAGE);
        }
        if let Some(status) = error.status() {
            let status = status.as_u16();
            return (ErrorKind::HttpStatus, i32::from(status), Self::status_message(status));
        }
        (ErrorKind::Unknown, codes::UNKNOWN, UNKNOWN_MESSAGE)
    }
}

impl From<CallError> for ClassifiedError {
    fn from(error: CallError) -> Self {
        ErrorClassifier::classify(error)
    }
}

/// Returns true if `error` or any of its sources mentions one of `markers`.
fn chain_mentions(error: Option<&(dyn StdError + 'static)>, markers: &[&str]) -> bool {
    let mut current = error;
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if markers.iter().any(|m| text.contains(m)) {
            return true;
        }
        current = e.source();
    }
    false
}

fn has_socket_error(error: &(dyn StdError + 'static)) -> bool {
    use std::io::ErrorKind as Io;

    let mut current = Some(error);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                Io::ConnectionRefused
                    | Io::ConnectionReset
                    | Io::ConnectionAborted
                    | Io::TimedOut
                    | Io::BrokenPipe
                    | Io::UnexpectedEof
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use portway_core::BusinessFailure;

    #[test]
    fn test_http_status_table() {
        let err = ErrorClassifier::classify(CallError::Status {
            status: 404,
            reason: "Not Found".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::HttpStatus);
        assert_eq!(err.code(), 404);
        assert_eq!(err.message(), "resource not found");
        assert!(err.cause().is_some());

        assert_eq!(ErrorClassifier::status_message(504), "server timed out");
        assert_eq!(ErrorClassifier::status_message(408), "server timed out");
        assert_eq!(ErrorClassifier::status_message(418), "network error");
    }

    #[test]
    fn test_business_failure_passes_through() {
        let err: ClassifiedError = CallError::Business(BusinessFailure {
            code: 4012,
            msg: "token expired".to_string(),
        })
        .into();
        assert_eq!(err.kind(), ErrorKind::Business);
        assert_eq!(err.code(), 4012);
        assert_eq!(err.message(), "token expired");
    }

    #[test]
    fn test_empty_business_message_is_replaced() {
        let err = ErrorClassifier::classify(CallError::Business(BusinessFailure {
            code: 500,
            msg: String::new(),
        }));
        assert!(!err.message().is_empty());
    }

    #[test]
    fn test_json_syntax_is_parse_error() {
        let raw = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = ErrorClassifier::classify(raw.into());
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.code(), codes::PARSE_ERROR);
        assert_eq!(err.message(), "data parsing error");
    }

    #[test]
    fn test_shape_mismatch_is_reported_as_such() {
        let raw = serde_json::from_str::<Vec<u32>>(r#"{"a":1}"#).unwrap_err();
        let err = ErrorClassifier::classify(raw.into());
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.code(), codes::HTTP_ERROR);
        assert_eq!(err.message(), "request failed, payload mismatch");
    }

    #[test]
    fn test_xml_error_is_parse_error() {
        let raw = quick_xml::de::from_str::<Vec<u32>>("<a>").unwrap_err();
        let err = ErrorClassifier::classify(CallError::Decode(DecodeError::Xml(raw)));
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.code(), codes::PARSE_ERROR);
    }

    #[test]
    fn test_everything_else_is_unknown() {
        let err = ErrorClassifier::classify(CallError::other("boom"));
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.code(), codes::UNKNOWN);
        assert!(!err.message().is_empty());
    }

    #[test]
    fn test_chain_markers() {
        let io = std::io::Error::other("invalid peer certificate: UnknownIssuer");
        assert!(chain_mentions(Some(&io), TLS_MARKERS));
        assert!(!chain_mentions(Some(&io), DNS_MARKERS));
        assert!(!chain_mentions(None, TLS_MARKERS));

        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(has_socket_error(&refused));
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        let raw = reqwest::Client::new()
            .get("http://127.0.0.1:9/")
            .send()
            .await
            .unwrap_err();
        let err = ErrorClassifier::classify(raw.into());
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert_eq!(err.code(), codes::NETWORK_ERROR);
        assert_eq!(err.message(), "connection timed out, check network");
    }
}
