// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! # Portway Store
//!
//! Cookie persistence for the Portway client registry.
//!
//! This crate provides:
//!
//! - **MemoryCookieStore**: cookies for the lifetime of the process
//! - **DurableCookieStore**: persistent cookies written through to a
//!   [`KeyValueStore`] and reloaded on start
//! - **DbCookieStore**: cookies in a SQLite database
//! - **Persistence**: File I/O helpers for JSON documents and default paths
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use portway_core::{Cookie, CookieStore};
//! use portway_store::{DurableCookieStore, JsonFileKv, default_cookie_path};
//!
//! let kv = Arc::new(JsonFileKv::open(default_cookie_path())?);
//! let store = DurableCookieStore::open(kv);
//!
//! store.add("example.com", vec![Cookie::new("sid", "abc", "example.com")]);
//! let cookies = store.get("example.com");
//! ```

pub mod durable;
pub mod error;
pub mod kv;
pub mod memory;
pub mod persistence;
pub mod sqlite;

pub use durable::DurableCookieStore;
pub use error::StoreError;
pub use kv::{JsonFileKv, KeyValueStore, MemoryKv};
pub use memory::MemoryCookieStore;
pub use persistence::{
    default_config_dir, default_cookie_db_path, default_cookie_path, default_data_dir,
    default_settings_path, load_json, load_json_or_default, save_json,
    write_atomic,
};
pub use sqlite::DbCookieStore;

#[cfg(test)]
mod persistence_tests;
