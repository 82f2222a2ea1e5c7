//! Bridges a [`CookieStore`] into the HTTP transport.
//!
//! Cookies are bucketed by request host: `Set-Cookie` headers received from
//! `www.example.com` are stored under that host and replayed only to it.

use std::sync::Arc;

use chrono::Utc;
use portway_core::{Cookie, CookieStore};
use reqwest::header::HeaderValue;
use tracing::{debug, trace};
use url::Url;

/// Cookie jar handed to the transport.
#[derive(Clone)]
pub struct CookieJar {
    store: Arc<dyn CookieStore>,
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("store", &self.store.name())
            .finish()
    }
}

impl CookieJar {
    /// Wraps `store`.
    pub fn new(store: Arc<dyn CookieStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn CookieStore> {
        &self.store
    }

    /// Parses and stores `Set-Cookie` values received from `url`.
    pub fn save_from_response<'a>(&self, url: &Url, headers: impl Iterator<Item = &'a str>) {
        let Some(host) = url.host_str() else { return };
        let now = Utc::now().timestamp_millis();
        let cookies: Vec<Cookie> = headers
            .filter_map(|h| Cookie::parse_set_cookie(h, host, now))
            .collect();
        if !cookies.is_empty() {
            debug!(host, count = cookies.len(), "Saving cookies");
            self.store.add(host, cookies);
        }
    }

    /// Renders the `Cookie` header value for a request to `url`.
    pub fn header_for_request(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let secure = url.scheme() == "https";
        let pairs: Vec<String> = self
            .store
            .get(host)
            .iter()
            .filter(|c| c.matches(host, url.path()) && (secure || !c.secure))
            .map(Cookie::header_pair)
            .collect();
        trace!(host, count = pairs.len(), "Loading cookies for request");
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.save_from_response(url, cookie_headers.filter_map(|v| v.to_str().ok()));
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_for_request(url)
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portway_store::MemoryCookieStore;

    fn jar() -> CookieJar {
        CookieJar::new(Arc::new(MemoryCookieStore::new()))
    }

    #[test]
    fn test_round_trip_through_store() {
        let jar = jar();
        let url: Url = "https://api.example.com/v1/login".parse().unwrap();
        jar.save_from_response(&url, ["sid=abc; Path=/", "lang=en"].into_iter());

        assert_eq!(jar.store().get("api.example.com").len(), 2);
        let header = jar
            .header_for_request(&"https://api.example.com/v1/me".parse().unwrap())
            .unwrap();
        assert_eq!(header, "sid=abc; lang=en");
    }

    #[test]
    fn test_secure_cookies_only_over_https() {
        let jar = jar();
        let url: Url = "https://example.com/".parse().unwrap();
        jar.save_from_response(&url, ["token=1; Secure"].into_iter());

        assert!(jar.header_for_request(&"http://example.com/".parse().unwrap()).is_none());
        assert!(jar.header_for_request(&url).is_some());
    }

    #[test]
    fn test_path_scoping_and_expiry() {
        let jar = jar();
        let url: Url = "https://example.com/".parse().unwrap();
        jar.save_from_response(&url, ["a=1; Path=/admin", "b=2; Max-Age=0"].into_iter());

        assert!(jar.header_for_request(&url).is_none());
        assert_eq!(
            jar.header_for_request(&"https://example.com/admin/x".parse().unwrap()).as_deref(),
            Some("a=1")
        );
    }
}
