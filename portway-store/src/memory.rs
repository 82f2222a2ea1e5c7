//! In-memory cookie store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use portway_core::{Cookie, CookieStore};
use tracing::trace;

/// Cookies grouped per domain, in insertion order.
///
/// Shared by the in-memory and durable backends; callers hold the lock.
#[derive(Debug, Default)]
pub(crate) struct CookieJarState {
    domains: HashMap<String, Vec<Cookie>>,
}

impl CookieJarState {
    /// Replaces any cookie sharing `cookie`'s identity, then appends it.
    /// Returns the replaced cookie.
    pub(crate) fn upsert(&mut self, domain: &str, cookie: Cookie) -> Option<Cookie> {
        let bucket = self.domains.entry(domain.to_string()).or_default();
        let identity = cookie.identity();
        let replaced = bucket
            .iter()
            .position(|c| c.identity() == identity)
            .map(|idx| bucket.remove(idx));
        bucket.push(cookie);
        replaced
    }

    /// Drops expired cookies of `domain` and returns them.
    pub(crate) fn purge_expired(&mut self, domain: &str, now_millis: i64) -> Vec<Cookie> {
        let Some(bucket) = self.domains.get_mut(domain) else {
            return Vec::new();
        };
        let (expired, live): (Vec<_>, Vec<_>) = bucket
            .drain(..)
            .partition(|c| c.is_expired_at(now_millis));
        *bucket = live;
        if bucket.is_empty() {
            self.domains.remove(domain);
        }
        expired
    }

    pub(crate) fn cookies(&self, domain: &str) -> Vec<Cookie> {
        self.domains.get(domain).cloned().unwrap_or_default()
    }

    /// Any persistent cookie with `identity`, in whichever domain holds it.
    pub(crate) fn find_persistent(&self, identity: &str) -> Option<&Cookie> {
        self.domains
            .values()
            .flatten()
            .find(|c| c.persistent && c.identity() == identity)
    }

    pub(crate) fn domains(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    pub(crate) fn remove(&mut self, domain: &str, identity: &str) -> Option<Cookie> {
        let bucket = self.domains.get_mut(domain)?;
        let idx = bucket.iter().position(|c| c.identity() == identity)?;
        let removed = bucket.remove(idx);
        if bucket.is_empty() {
            self.domains.remove(domain);
        }
        Some(removed)
    }

    pub(crate) fn clear(&mut self) {
        self.domains.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

// ============================================================================
// MemoryCookieStore
// ============================================================================

/// Cookie store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    state: Mutex<CookieJarState>,
}

impl MemoryCookieStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookieStore {
    fn add(&self, domain: &str, cookies: Vec<Cookie>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for cookie in cookies {
            trace!(domain, identity = %cookie.identity(), "Storing cookie");
            state.upsert(domain, cookie);
        }
    }

    fn get(&self, domain: &str) -> Vec<Cookie> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = state.purge_expired(domain, Utc::now().timestamp_millis());
        if !expired.is_empty() {
            trace!(domain, count = expired.len(), "Purged expired cookies");
        }
        state.cookies(domain)
    }

    fn get_all(&self) -> Vec<Cookie> {
        let now = Utc::now().timestamp_millis();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = Vec::new();
        for domain in state.domains() {
            state.purge_expired(&domain, now);
            all.extend(state.cookies(&domain));
        }
        all
    }

    fn remove(&self, domain: &str, cookie: &Cookie) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(domain, &cookie.identity())
            .is_some()
    }

    fn remove_all(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.clear();
        state.is_empty()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
