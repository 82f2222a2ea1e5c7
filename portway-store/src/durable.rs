//! Durable cookie store mirrored to a key-value backend.
//!
//! # Layout
//!
//! Two kinds of records live in the backend:
//!
//! - `index:<domain>` holds the comma-joined identities of the persistent
//!   cookies stored under that domain.
//! - `cookie:<identity>` holds one cookie, hex-encoded.
//!
//! The in-memory state is the source of truth for reads; every mutation
//! writes through before the call returns. Session cookies never reach the
//! backend.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use portway_core::{Cookie, CookieStore};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::kv::KeyValueStore;
use crate::memory::CookieJarState;

const INDEX_PREFIX: &str = "index:";
const COOKIE_PREFIX: &str = "cookie:";

fn index_key(domain: &str) -> String {
    format!("{INDEX_PREFIX}{domain}")
}

fn cookie_key(identity: &str) -> String {
    format!("{COOKIE_PREFIX}{identity}")
}

/// Cookie store whose persistent cookies survive a restart.
pub struct DurableCookieStore {
    kv: Arc<dyn KeyValueStore>,
    state: Mutex<CookieJarState>,
}

impl std::fmt::Debug for DurableCookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableCookieStore").finish_non_exhaustive()
    }
}

impl DurableCookieStore {
    /// Opens the store, eagerly reloading every persisted cookie.
    ///
    /// Entries that fail to decode are skipped and dropped from the index.
    pub fn open(kv: Arc<dyn KeyValueStore>) -> Self {
        let mut state = CookieJarState::default();
        let mut loaded = 0usize;

        for key in kv.keys_with_prefix(INDEX_PREFIX) {
            let domain = &key[INDEX_PREFIX.len()..];
            let Some(index) = kv.get(&key) else { continue };
            for identity in index.split(',').filter(|s| !s.is_empty()) {
                match load_cookie(kv.as_ref(), identity) {
                    Ok(Some(cookie)) => {
                        state.upsert(domain, cookie);
                        loaded += 1;
                    }
                    Ok(None) => debug!(domain, identity, "Index entry without cookie record"),
                    Err(e) => warn!(domain, identity, error = %e, "Skipping corrupt cookie"),
                }
            }
        }

        info!(cookies = loaded, "Reloaded durable cookies");
        let store = Self {
            kv,
            state: Mutex::new(state),
        };
        // Rewrite indexes so skipped entries do not linger.
        {
            let state = store.state.lock().unwrap_or_else(PoisonError::into_inner);
            for domain in state.domains() {
                store.write_index(&state, &domain);
            }
        }
        store
    }

    fn write_index(&self, state: &CookieJarState, domain: &str) {
        let identities: Vec<String> = state
            .cookies(domain)
            .iter()
            .filter(|c| c.persistent)
            .map(Cookie::identity)
            .collect();
        let key = index_key(domain);
        let result = if identities.is_empty() {
            self.kv.remove(&key)
        } else {
            self.kv.put(&key, &identities.join(","))
        };
        if let Err(e) = result {
            warn!(domain, error = %e, "Failed to write cookie index");
        }
    }

    fn write_cookie(&self, cookie: &Cookie) {
        let key = cookie_key(&cookie.identity());
        let result = match cookie.encode() {
            Ok(encoded) => self.kv.put(&key, &encoded),
            Err(source) => Err(StoreError::Corrupt { key, source }),
        };
        if let Err(e) = result {
            warn!(identity = %cookie.identity(), error = %e, "Failed to persist cookie");
        }
    }

    /// Drops the `cookie:<identity>` record once no domain holds it
    /// persistently; otherwise rewrites it from the remaining holder.
    ///
    /// Call after `state` no longer holds the released cookie.
    fn release_cookie(&self, state: &CookieJarState, identity: &str) {
        if let Some(holder) = state.find_persistent(identity) {
            debug!(identity, "Cookie record still held by another domain");
            self.write_cookie(holder);
            return;
        }
        if let Err(e) = self.kv.remove(&cookie_key(identity)) {
            warn!(identity, error = %e, "Failed to delete persisted cookie");
        }
    }

    fn purge(&self, state: &mut CookieJarState, domain: &str, now: i64) {
        let expired = state.purge_expired(domain, now);
        if expired.is_empty() {
            return;
        }
        debug!(domain, count = expired.len(), "Purging expired cookies");
        for cookie in &expired {
            self.release_cookie(state, &cookie.identity());
        }
        self.write_index(state, domain);
    }
}

fn load_cookie(kv: &dyn KeyValueStore, identity: &str) -> Result<Option<Cookie>, StoreError> {
    let key = cookie_key(identity);
    let Some(encoded) = kv.get(&key) else {
        return Ok(None);
    };
    Cookie::decode(&encoded)
        .map(Some)
        .map_err(|source| StoreError::Corrupt { key, source })
}

impl CookieStore for DurableCookieStore {
    fn add(&self, domain: &str, cookies: Vec<Cookie>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for cookie in cookies {
            if cookie.persistent {
                self.write_cookie(&cookie);
                state.upsert(domain, cookie);
            } else {
                let identity = cookie.identity();
                state.upsert(domain, cookie);
                self.release_cookie(&state, &identity);
            }
        }
        self.write_index(&state, domain);
    }

    fn get(&self, domain: &str) -> Vec<Cookie> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.purge(&mut state, domain, Utc::now().timestamp_millis());
        state.cookies(domain)
    }

    fn get_all(&self) -> Vec<Cookie> {
        let now = Utc::now().timestamp_millis();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = Vec::new();
        for domain in state.domains() {
            self.purge(&mut state, &domain, now);
            all.extend(state.cookies(&domain));
        }
        all
    }

    fn remove(&self, domain: &str, cookie: &Cookie) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let identity = cookie.identity();
        if state.remove(domain, &identity).is_none() {
            return false;
        }
        self.release_cookie(&state, &identity);
        self.write_index(&state, domain);
        true
    }

    fn remove_all(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.clear();

        let mut ok = true;
        for key in self
            .kv
            .keys_with_prefix(INDEX_PREFIX)
            .into_iter()
            .chain(self.kv.keys_with_prefix(COOKIE_PREFIX))
        {
            if let Err(e) = self.kv.remove(&key) {
                warn!(key, error = %e, "Failed to clear persisted cookie record");
                ok = false;
            }
        }
        ok
    }

    fn name(&self) -> &'static str {
        "durable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{JsonFileKv, MemoryKv};

    fn future() -> i64 {
        Utc::now().timestamp_millis() + 3_600_000
    }

    fn past() -> i64 {
        Utc::now().timestamp_millis() - 1_000
    }

    #[test]
    fn test_persistent_cookie_survives_reload() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let cookie = Cookie::new("sid", "abc", "example.com")
            .with_path("/api")
            .with_expires_at(future())
            .with_secure(true);

        DurableCookieStore::open(Arc::clone(&kv)).add("example.com", vec![cookie.clone()]);

        let reloaded = DurableCookieStore::open(kv);
        assert_eq!(reloaded.get("example.com"), vec![cookie]);
    }

    #[test]
    fn test_persisted_layout() {
        let kv = Arc::new(MemoryKv::new());
        let store = DurableCookieStore::open(kv.clone());
        store.add(
            "example.com",
            vec![
                Cookie::new("a", "1", "example.com").with_expires_at(future()),
                Cookie::new("b", "2", "example.com").with_expires_at(future()),
            ],
        );

        assert_eq!(
            kv.get("index:example.com").as_deref(),
            Some("a@example.com,b@example.com")
        );
        let encoded = kv.get("cookie:a@example.com").unwrap();
        assert_eq!(Cookie::decode(&encoded).unwrap().value, "1");
    }

    #[test]
    fn test_session_cookie_is_memory_only() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let store = DurableCookieStore::open(Arc::clone(&kv));
        store.add(
            "example.com",
            vec![Cookie::new("sid", "1", "example.com").with_expires_at(future())],
        );
        assert!(kv.get("cookie:sid@example.com").is_some());

        // Same identity, now a session cookie: dropped from the durable index.
        store.add("example.com", vec![Cookie::new("sid", "2", "example.com")]);
        assert!(kv.get("cookie:sid@example.com").is_none());
        assert!(kv.get("index:example.com").is_none());
        assert_eq!(store.get("example.com")[0].value, "2");

        let reloaded = DurableCookieStore::open(kv);
        assert!(reloaded.get("example.com").is_empty());
    }

    #[test]
    fn test_shared_identity_survives_other_domain_session_write() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let store = DurableCookieStore::open(Arc::clone(&kv));
        store.add(
            "a.example.com",
            vec![Cookie::new("sid", "A", "example.com").with_expires_at(future())],
        );
        store.add("b.example.com", vec![Cookie::new("sid", "B", "example.com")]);

        assert!(kv.get("cookie:sid@example.com").is_some());
        assert!(kv.get("index:b.example.com").is_none());

        let reloaded = DurableCookieStore::open(kv);
        let cookies = reloaded.get("a.example.com");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "A");
        assert!(reloaded.get("b.example.com").is_empty());
    }

    #[test]
    fn test_shared_identity_restored_after_other_domain_remove() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let store = DurableCookieStore::open(Arc::clone(&kv));
        let a = Cookie::new("sid", "A", "example.com").with_expires_at(future());
        let b = Cookie::new("sid", "B", "example.com").with_expires_at(future());
        store.add("a.example.com", vec![a]);
        store.add("b.example.com", vec![b.clone()]);

        assert!(store.remove("b.example.com", &b));

        let reloaded = DurableCookieStore::open(kv);
        let cookies = reloaded.get("a.example.com");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "A");
        assert!(reloaded.get("b.example.com").is_empty());
    }

    #[test]
    fn test_expired_cookie_purged_from_durable_index_on_read() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let store = DurableCookieStore::open(Arc::clone(&kv));
        store.add(
            "example.com",
            vec![
                Cookie::new("old", "1", "example.com").with_expires_at(past()),
                Cookie::new("new", "2", "example.com").with_expires_at(future()),
            ],
        );
        assert!(kv.get("cookie:old@example.com").is_some());

        let cookies = store.get("example.com");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "new");
        assert!(kv.get("cookie:old@example.com").is_none());
        assert_eq!(kv.get("index:example.com").as_deref(), Some("new@example.com"));
    }

    #[test]
    fn test_remove_all_clears_backend() {
        let kv = Arc::new(MemoryKv::new());
        let store = DurableCookieStore::open(kv.clone());
        store.add(
            "a.com",
            vec![Cookie::new("x", "1", "a.com").with_expires_at(future())],
        );
        store.add(
            "b.com",
            vec![Cookie::new("y", "1", "b.com").with_expires_at(future())],
        );

        assert!(store.remove_all());
        assert!(store.get_all().is_empty());
        assert!(kv.is_empty());
    }

    #[test]
    fn test_corrupt_record_is_skipped() {
        let kv = Arc::new(MemoryKv::new());
        let good = Cookie::new("ok", "1", "a.com").with_expires_at(future());
        kv.put("index:a.com", "ok@a.com,bad@a.com,missing@a.com").unwrap();
        kv.put("cookie:ok@a.com", &good.encode().unwrap()).unwrap();
        kv.put("cookie:bad@a.com", "zz").unwrap();

        let store = DurableCookieStore::open(kv.clone());
        assert_eq!(store.get("a.com"), vec![good]);
        assert_eq!(kv.get("index:a.com").as_deref(), Some("ok@a.com"));
    }

    #[test]
    fn test_file_backed_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        let cookie = Cookie::new("token", "t", "api.example.com").with_expires_at(future());

        {
            let kv = Arc::new(JsonFileKv::open(&path).unwrap());
            DurableCookieStore::open(kv).add("api.example.com", vec![cookie.clone()]);
        }

        let kv = Arc::new(JsonFileKv::open(&path).unwrap());
        let store = DurableCookieStore::open(kv);
        assert_eq!(store.get("api.example.com"), vec![cookie]);
    }
}
