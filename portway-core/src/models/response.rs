//! The server response envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server-declared status code meaning "success".
pub const SUCCESS_CODE: i32 = 200;

/// The `{code, msg, data}` envelope wrapping every server payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Server-declared status code.
    pub code: i32,
    /// Server-declared message.
    #[serde(default)]
    pub msg: String,
    /// Payload, absent on failures and for empty results.
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Creates a success envelope around `data`.
    pub fn success(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: String::new(),
            data: Some(data),
        }
    }

    /// Returns true if the server declared success.
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Unwraps the envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`BusinessFailure`] carrying the server's code and message
    /// when the declared status is not success.
    pub fn into_result(self) -> Result<Option<T>, BusinessFailure> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(BusinessFailure {
                code: self.code,
                msg: self.msg,
            })
        }
    }
}

/// A failure declared by the server inside a well-formed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{msg} (code {code})")]
pub struct BusinessFailure {
    /// Server-declared code.
    pub code: i32,
    /// Server-declared message.
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result_success() {
        let response = ApiResponse::success(42);
        assert!(response.is_success());
        assert_eq!(response.into_result(), Ok(Some(42)));
    }

    #[test]
    fn test_into_result_business_failure() {
        let response: ApiResponse<u32> = ApiResponse {
            code: 4001,
            msg: "token expired".to_string(),
            data: None,
        };
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, 4001);
        assert_eq!(err.msg, "token expired");
        assert_eq!(err.to_string(), "token expired (code 4001)");
    }
}
