// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `Portway` Core
//!
//! Core types, models, and traits for the `Portway` HTTP client registry.
//!
//! This crate provides the foundational abstractions shared by the store,
//! client and CLI crates:
//!
//! - Domain models (cookies, the server response envelope)
//! - The failure taxonomy delivered to callers
//! - The cookie persistence capability trait
//!
//! ## Key Types
//!
//! ### Cookies
//! - [`Cookie`] - A stored cookie with its identity, scope and expiry
//! - [`CookieStore`] - Capability interface implemented by every backend
//!
//! ### Responses
//! - [`ApiResponse`] - The `{code, msg, data}` envelope returned by servers
//! - [`BusinessFailure`] - A server-declared failure carried by the envelope
//!
//! ### Failures
//! - [`ErrorKind`] - The closed set of failure classes
//! - [`ClassifiedError`] - Kind, code and human-readable message
//! - [`codes`] - Numeric codes for non-HTTP failures

pub mod error;
pub mod models;
pub mod traits;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Cookies
    Cookie,
    MAX_EXPIRES_AT,
    // Responses
    ApiResponse,
    BusinessFailure,
    SUCCESS_CODE,
    // Failures
    ClassifiedError,
    ErrorKind,
    codes,
};

// Re-export traits
pub use traits::CookieStore;
