//! Domain models for Portway.
//!
//! ## Submodules
//!
//! - [`cookie`] - Stored cookies and their persisted encoding
//! - [`response`] - The server response envelope
//! - [`failure`] - The failure taxonomy delivered to callers

mod cookie;
mod failure;
mod response;

// Re-export everything at the models level
pub use cookie::{Cookie, MAX_EXPIRES_AT};
pub use failure::{ClassifiedError, ErrorKind, codes};
pub use response::{ApiResponse, BusinessFailure, SUCCESS_CODE};

#[cfg(test)]
mod serde_tests;
