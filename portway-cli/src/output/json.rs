//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use portway_client::{HttpResponse, NetworkConfig};
use portway_core::{ClassifiedError, Cookie, MAX_EXPIRES_AT};
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// Output Types
// ============================================================================

/// JSON output for a completed request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOutput {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub from_cache: bool,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
}

/// JSON output for a classified failure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub kind: String,
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// JSON output for a stored cookie.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieOutput {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

/// JSON output for an effective endpoint configuration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOutput {
    pub base_url: String,
    pub source: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub retry_on_connect_failure: bool,
    pub enable_cache: bool,
    pub cache_max_age_secs: u64,
    pub cache_max_stale_secs: u64,
    pub converter_mode: Option<String>,
    pub cookie_mode: String,
    pub headers: BTreeMap<String, String>,
    pub url_params: BTreeMap<String, String>,
    pub print_default_log: bool,
}

impl ResponseOutput {
    /// Builds output from a response. Non-JSON bodies become a string.
    pub fn from_response(response: &HttpResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let body = serde_json::from_slice(&response.body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&response.body).into_owned())
        });

        Self {
            method: response.method.to_string(),
            url: response.url.to_string(),
            status: response.status.as_u16(),
            from_cache: response.from_cache,
            headers,
            body,
        }
    }
}

impl From<&ClassifiedError> for ErrorOutput {
    fn from(error: &ClassifiedError) -> Self {
        Self {
            kind: error.kind().as_str().to_string(),
            code: error.code(),
            message: error.message().to_string(),
            cause: error.cause().map(ToString::to_string),
        }
    }
}

impl From<&Cookie> for CookieOutput {
    fn from(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires_at: expiry_to_rfc3339(cookie),
            secure: cookie.secure,
            http_only: cookie.http_only,
        }
    }
}

impl ConfigOutput {
    /// Builds output from a resolved configuration.
    pub fn new(base_url: &str, source: &str, config: &NetworkConfig) -> Self {
        let timeouts = config.timeouts();
        Self {
            base_url: base_url.to_string(),
            source: source.to_string(),
            connect_timeout_ms: millis(timeouts.connect),
            read_timeout_ms: millis(timeouts.read),
            write_timeout_ms: millis(timeouts.write),
            retry_on_connect_failure: config.retry_on_connect_failure,
            enable_cache: config.enable_cache,
            cache_max_age_secs: config.effective_max_age_secs(),
            cache_max_stale_secs: config.effective_max_stale_secs(),
            converter_mode: config.converter_mode.map(|m| m.to_string()),
            cookie_mode: config.cookie_mode.unwrap_or_default().to_string(),
            headers: config.headers.clone(),
            url_params: config.url_params.clone(),
            print_default_log: config.print_default_log,
        }
    }
}

// ============================================================================
// Serialization helpers
// ============================================================================

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Session cookies and the far-future sentinel have no printable expiry.
pub(crate) fn expiry(cookie: &Cookie) -> Option<DateTime<Utc>> {
    if !cookie.persistent || cookie.expires_at >= MAX_EXPIRES_AT {
        return None;
    }
    Utc.timestamp_millis_opt(cookie.expires_at).single()
}

fn expiry_to_rfc3339(cookie: &Cookie) -> Option<String> {
    expiry(cookie).map(|dt| dt.to_rfc3339())
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats a response.
    pub fn format_response(&self, response: &HttpResponse) -> Result<String> {
        self.format(&ResponseOutput::from_response(response))
    }

    /// Formats a classified failure.
    pub fn format_error(&self, error: &ClassifiedError) -> Result<String> {
        self.format(&ErrorOutput::from(error))
    }

    /// Formats a cookie listing.
    pub fn format_cookies(&self, cookies: &[Cookie]) -> Result<String> {
        let outputs: Vec<CookieOutput> = cookies.iter().map(CookieOutput::from).collect();
        self.format(&outputs)
    }

    /// Formats an effective configuration.
    pub fn format_config(&self, output: &ConfigOutput) -> Result<String> {
        self.format(output)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pretty() {
        let formatter = JsonFormatter::new(true);
        let data = serde_json::json!({"key": "value"});
        let output = formatter.format(&data).unwrap();
        assert!(output.contains('\n'));
    }

    #[test]
    fn test_format_compact() {
        let formatter = JsonFormatter::new(false);
        let data = serde_json::json!({"key": "value"});
        let output = formatter.format(&data).unwrap();
        assert!(!output.contains('\n'));
    }

    #[test]
    fn test_session_cookie_has_no_expiry() {
        let cookie = Cookie::new("sid", "abc", "example.com");
        let output = CookieOutput::from(&cookie);
        assert!(output.expires_at.is_none());
    }

    #[test]
    fn test_config_output_fills_defaults() {
        let config = NetworkConfig::new("");
        let output = ConfigOutput::new("https://api.example.com/", "default", &config);
        assert_eq!(output.connect_timeout_ms, 40_000);
        assert_eq!(output.cookie_mode, "MEMORY");
        assert_eq!(output.converter_mode.as_deref(), Some("GSON"));
    }
}
