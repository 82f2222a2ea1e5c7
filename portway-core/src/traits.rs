//! Trait definitions for Portway.
//!
//! This module defines the capability interface every cookie backend
//! must satisfy, whether built in or supplied by the application.

use crate::models::Cookie;

/// Per-domain cookie persistence.
///
/// Implementors are shared across request threads, so every method takes
/// `&self` and implementations must guard their own state. Read-modify-write
/// sequences (`add`, `remove`) must be atomic with respect to each other.
///
/// # Expiry
///
/// `get` must purge expired cookies as a side effect of reading and never
/// return them. Backends with durable storage must remove the purged
/// entries from storage as well.
pub trait CookieStore: Send + Sync {
    /// Stores `cookies` under `domain`.
    ///
    /// A cookie sharing its identity (name + domain) with an existing entry
    /// replaces that entry.
    fn add(&self, domain: &str, cookies: Vec<Cookie>);

    /// Returns the live cookies stored under `domain`, purging expired ones.
    fn get(&self, domain: &str) -> Vec<Cookie>;

    /// Returns every live cookie across all domains.
    fn get_all(&self) -> Vec<Cookie>;

    /// Removes a single cookie. Returns `true` if it was present.
    fn remove(&self, domain: &str, cookie: &Cookie) -> bool;

    /// Removes every cookie. Returns `true` when the store is now empty.
    fn remove_all(&self) -> bool;

    /// Returns the backend's display name, used in logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}
