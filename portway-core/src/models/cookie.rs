//! Stored cookies.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Expiry used for cookies without an explicit lifetime
/// (9999-12-31T23:59:59.999Z in epoch milliseconds).
pub const MAX_EXPIRES_AT: i64 = 253_402_300_799_999;

/// Legacy `Expires` layout still sent by many servers.
const NETSCAPE_DATE_FORMAT: &str = "%a, %d-%b-%Y %H:%M:%S GMT";

// ============================================================================
// Cookie
// ============================================================================

/// A cookie as stored by a [`CookieStore`](crate::CookieStore).
///
/// Two cookies with the same name and domain are the same cookie; see
/// [`Cookie::identity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie is scoped to, without a leading dot.
    pub domain: String,
    /// Path the cookie is scoped to.
    pub path: String,
    /// Expiry instant in epoch milliseconds.
    pub expires_at: i64,
    /// Whether the cookie should survive a process restart.
    pub persistent: bool,
    /// Only send over HTTPS.
    #[serde(default)]
    pub secure: bool,
    /// Not exposed to scripts.
    #[serde(default)]
    pub http_only: bool,
    /// Only sent to the exact domain, never to subdomains.
    #[serde(default)]
    pub host_only: bool,
}

impl Cookie {
    /// Creates a session cookie scoped to `domain` and path `/`.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            path: "/".to_string(),
            expires_at: MAX_EXPIRES_AT,
            persistent: false,
            secure: false,
            http_only: false,
            host_only: true,
        }
    }

    /// Sets the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets an explicit expiry, which makes the cookie persistent.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = expires_at;
        self.persistent = true;
        self
    }

    /// Marks the cookie as secure-only.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Returns the uniqueness key, `name@domain`.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.name, self.domain)
    }

    /// Returns true if the cookie expired before `now_millis`.
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expires_at < now_millis
    }

    /// Returns true if the cookie has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Returns true if the cookie should be sent to `host` for `path`.
    pub fn matches(&self, host: &str, path: &str) -> bool {
        self.domain_matches(host) && self.path_matches(path)
    }

    fn domain_matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if host == self.domain {
            return true;
        }
        !self.host_only
            && host.len() > self.domain.len()
            && host.ends_with(&self.domain)
            && host.as_bytes()[host.len() - self.domain.len() - 1] == b'.'
    }

    fn path_matches(&self, path: &str) -> bool {
        if path == self.path {
            return true;
        }
        path.starts_with(&self.path)
            && (self.path.ends_with('/') || path.as_bytes().get(self.path.len()) == Some(&b'/'))
    }

    /// Renders the `name=value` pair sent in a `Cookie` request header.
    pub fn header_pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    // ========================================================================
    // Persisted form
    // ========================================================================

    /// Encodes the full attribute set as hex text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String, CoreError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(bytes))
    }

    /// Decodes a value produced by [`Cookie::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not hex or does not describe a cookie.
    pub fn decode(encoded: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(encoded.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ========================================================================
    // Set-Cookie parsing
    // ========================================================================

    /// Parses a `Set-Cookie` header received from `request_host`.
    ///
    /// Returns `None` for headers without a `name=value` pair or whose
    /// `Domain` attribute does not cover the request host.
    pub fn parse_set_cookie(header: &str, request_host: &str, now_millis: i64) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Self::new(name, value.trim().trim_matches('"'), request_host);
        let mut expires: Option<i64> = None;
        let mut max_age: Option<i64> = None;

        for attribute in parts {
            let (key, val) = match attribute.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attribute.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    cookie.domain = normalize_domain(val);
                    cookie.host_only = false;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => expires = parse_expires(val),
                "max-age" => max_age = val.parse().ok(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        if !cookie.host_only && !cookie.domain_matches(request_host) {
            return None;
        }

        // Max-Age wins over Expires when both are present.
        if let Some(seconds) = max_age {
            cookie.persistent = true;
            cookie.expires_at = if seconds <= 0 {
                i64::MIN
            } else {
                now_millis
                    .saturating_add(seconds.saturating_mul(1000))
                    .min(MAX_EXPIRES_AT)
            };
        } else if let Some(at) = expires {
            cookie.persistent = true;
            cookie.expires_at = at.min(MAX_EXPIRES_AT);
        }

        Some(cookie)
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn parse_expires(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(value, NETSCAPE_DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

// ============================================================================
// Tests
// ============================================================================
