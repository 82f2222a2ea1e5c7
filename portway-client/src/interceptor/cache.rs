//! Cache-control stage and the response cache behind it.
//!
//! Online, requests and responses are annotated with
//! `Cache-Control: public, max-age=<N>` and successful GET responses are
//! kept. Offline, requests are annotated with
//! `Cache-Control: public, only-if-cached, max-stale=<M>` and answered from
//! the cache, or with a synthesized `504` when nothing usable is cached.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA};
use reqwest::{Method, StatusCode};
use tracing::{debug, trace};

use super::{ChainContext, Interceptor};
use crate::message::{HttpRequest, HttpResponse};

/// Default cache capacity: 10 MiB of response bodies.
pub const DEFAULT_CACHE_CAPACITY_BYTES: usize = 10 * 1024 * 1024;

const UNSATISFIABLE_BODY: &str = "Unsatisfiable Request (only-if-cached)";

// ============================================================================
// ResponseCache
// ============================================================================

#[derive(Debug)]
struct CachedEntry {
    response: HttpResponse,
    stored_at_millis: i64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CachedEntry>,
    order: VecDeque<String>,
    size: usize,
}

impl CacheState {
    fn remove(&mut self, key: &str) {
        if let Some(old) = self.entries.remove(key) {
            self.size -= old.response.body.len();
            self.order.retain(|k| k != key);
        }
    }
}

/// Bounded in-memory cache of successful GET responses, keyed by URL.
///
/// When full, the oldest entries are evicted first.
#[derive(Debug)]
pub struct ResponseCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY_BYTES)
    }
}

impl ResponseCache {
    /// Creates a cache holding at most `capacity` body bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Stores `response` under its URL.
    pub fn store(&self, response: &HttpResponse) {
        self.store_at(response, Utc::now().timestamp_millis());
    }

    fn store_at(&self, response: &HttpResponse, stored_at_millis: i64) {
        let size = response.body.len();
        if size > self.capacity {
            trace!(url = %response.url, size, "Response too large to cache");
            return;
        }
        let key = response.url.to_string();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.remove(&key);
        while state.size + size > self.capacity {
            let Some(oldest) = state.order.pop_front() else { break };
            if let Some(evicted) = state.entries.remove(&oldest) {
                state.size -= evicted.response.body.len();
            }
        }
        state.size += size;
        state.order.push_back(key.clone());
        state.entries.insert(
            key,
            CachedEntry {
                response: response.clone(),
                stored_at_millis,
            },
        );
    }

    /// Returns the cached response for `url` if it is at most
    /// `max_age_millis` old.
    pub fn lookup(&self, url: &str, max_age_millis: i64) -> Option<HttpResponse> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = state.entries.get(url)?;
        let age = Utc::now().timestamp_millis() - entry.stored_at_millis;
        (age <= max_age_millis).then(|| entry.response.clone())
    }

    /// Returns the total cached body size in bytes.
    pub fn size(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).size
    }

    /// Returns the number of cached responses.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// CacheInterceptor
// ============================================================================

/// Annotates cache-control headers by connectivity and serves cached
/// responses while offline.
#[derive(Debug, Clone)]
pub struct CacheInterceptor {
    max_age_secs: u64,
    max_stale_secs: u64,
    cache: Arc<ResponseCache>,
}

impl CacheInterceptor {
    /// Creates the stage over `cache`.
    pub fn new(max_age_secs: u64, max_stale_secs: u64, cache: Arc<ResponseCache>) -> Self {
        Self {
            max_age_secs,
            max_stale_secs,
            cache,
        }
    }

    /// Returns the cache behind this stage.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    fn online_header(&self) -> HeaderValue {
        header_value(&format!("public, max-age={}", self.max_age_secs))
    }

    fn offline_header(&self) -> HeaderValue {
        header_value(&format!("public, only-if-cached, max-stale={}", self.max_stale_secs))
    }

    fn usable_age_millis(&self) -> i64 {
        let secs = self.max_age_secs.saturating_add(self.max_stale_secs);
        i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

fn header_value(value: &str) -> HeaderValue {
    // Only ASCII digits, letters, commas and spaces are ever formatted in.
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("public"))
}

impl Interceptor for CacheInterceptor {
    fn name(&self) -> &str {
        "cache"
    }

    fn on_before_request(&self, mut request: HttpRequest, ctx: &ChainContext) -> HttpRequest {
        // `Pragma: no-cache` would override either directive.
        request.headers.remove(PRAGMA);
        let directive = if ctx.connected {
            self.online_header()
        } else {
            self.offline_header()
        };
        request.headers.insert(CACHE_CONTROL, directive);
        request
    }

    fn cached_response(&self, request: &HttpRequest, ctx: &ChainContext) -> Option<HttpResponse> {
        if ctx.connected || request.method != Method::GET {
            return None;
        }
        let key = request.url.as_str();
        if let Some(mut cached) = self.cache.lookup(key, self.usable_age_millis()) {
            debug!(url = %request.url, "Offline, serving cached response");
            cached.from_cache = true;
            return Some(cached);
        }
        debug!(url = %request.url, "Offline and nothing cached");
        Some(HttpResponse::new(
            StatusCode::GATEWAY_TIMEOUT,
            request.url.clone(),
            UNSATISFIABLE_BODY,
        ))
    }

    fn on_after_request(&self, response: &HttpResponse, ctx: &ChainContext) -> Option<HttpResponse> {
        if !ctx.connected || response.from_cache {
            return None;
        }
        let mut rewritten = response.clone();
        rewritten.headers.remove(PRAGMA);
        rewritten.headers.insert(CACHE_CONTROL, self.online_header());
        if rewritten.method == Method::GET && rewritten.is_success() {
            self.cache.store(&rewritten);
        }
        Some(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const URL: &str = "https://api.example.com/items";

    fn stage() -> CacheInterceptor {
        CacheInterceptor::new(60, 120, Arc::new(ResponseCache::default()))
    }

    fn ok_response() -> HttpResponse {
        HttpResponse::new(StatusCode::OK, URL.parse().unwrap(), "[1,2,3]")
    }

    #[test]
    fn test_online_annotation() {
        let ctx = ChainContext::new("https://api.example.com/", true);
        let request = HttpRequest::get(URL.parse().unwrap())
            .with_header(PRAGMA, HeaderValue::from_static("no-cache"));

        let request = stage().on_before_request(request, &ctx);

        assert_eq!(request.header("cache-control"), Some("public, max-age=60"));
        assert!(request.header("pragma").is_none());
    }

    #[test]
    fn test_offline_annotation_applies_to_outbound_request() {
        let ctx = ChainContext::new("https://api.example.com/", false);
        let request = HttpRequest::get(URL.parse().unwrap())
            .with_header(PRAGMA, HeaderValue::from_static("no-cache"));

        let request = stage().on_before_request(request, &ctx);

        assert_eq!(
            request.header("cache-control"),
            Some("public, only-if-cached, max-stale=120")
        );
        assert!(request.header("pragma").is_none());
    }

    #[test]
    fn test_online_response_is_rewritten_and_stored() {
        let stage = stage();
        let ctx = ChainContext::new("https://api.example.com/", true);
        let mut response = ok_response();
        response
            .headers
            .insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let rewritten = stage.on_after_request(&response, &ctx).unwrap();

        assert_eq!(rewritten.header("cache-control"), Some("public, max-age=60"));
        assert!(rewritten.header("pragma").is_none());
        assert_eq!(stage.cache().len(), 1);
    }

    #[test]
    fn test_offline_serves_cached_response() {
        let stage = stage();
        stage.cache().store(&ok_response());
        let ctx = ChainContext::new("https://api.example.com/", false);
        let request = HttpRequest::get(URL.parse().unwrap());

        let cached = stage.cached_response(&request, &ctx).unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.text(), Some("[1,2,3]"));
        assert!(stage.cached_response(&request, &ChainContext::new("x", true)).is_none());
    }

    #[test]
    fn test_offline_without_cache_is_504() {
        let ctx = ChainContext::new("https://api.example.com/", false);
        let request = HttpRequest::get(URL.parse().unwrap());
        let response = stage().cached_response(&request, &ctx).unwrap();
        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
        assert!(!response.from_cache);
    }

    #[test]
    fn test_stale_entry_is_not_served() {
        let stage = stage();
        let too_old = Utc::now().timestamp_millis() - 181_000;
        stage.cache().store_at(&ok_response(), too_old);
        let ctx = ChainContext::new("https://api.example.com/", false);
        let response = stage
            .cached_response(&HttpRequest::get(URL.parse().unwrap()), &ctx)
            .unwrap();
        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_non_get_and_failures_are_not_cached() {
        let stage = stage();
        let ctx = ChainContext::new("https://api.example.com/", true);
        stage.on_after_request(&ok_response().with_method(Method::POST), &ctx);
        stage.on_after_request(
            &HttpResponse::new(StatusCode::NOT_FOUND, URL.parse().unwrap(), ""),
            &ctx,
        );
        assert!(stage.cache().is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = ResponseCache::new(10);
        for (i, body) in ["aaaa", "bbbb", "cccc"].iter().enumerate() {
            let url = format!("https://api.example.com/{i}");
            cache.store(&HttpResponse::new(StatusCode::OK, url.parse().unwrap(), *body));
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.size(), 8);
        assert!(cache.lookup("https://api.example.com/0", i64::MAX).is_none());
        assert!(cache.lookup("https://api.example.com/2", i64::MAX).is_some());
    }
}
