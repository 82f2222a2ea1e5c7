//! Request/response logging stage.

use tracing::debug;

use super::{ChainContext, Interceptor};
use crate::message::{HttpRequest, HttpResponse};

/// Target used for every event emitted by [`LoggingInterceptor`].
pub const LOG_TARGET: &str = "portway::http";

/// Headers whose values are never logged.
const REDACTED_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "proxy-authorization"];

/// Logs each request and response at `debug` level.
///
/// Textual bodies are logged with `\uXXXX` escapes decoded; binary bodies
/// are summarized by size. The stage never changes the exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    /// Creates the stage.
    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_before_request(&self, request: HttpRequest, _ctx: &ChainContext) -> HttpRequest {
        debug!(target: LOG_TARGET, method = %request.method, url = %request.url, "--> request");
        for (name, value) in &request.headers {
            let value = if REDACTED_HEADERS.contains(&name.as_str()) {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            debug!(target: LOG_TARGET, header = %name, value, "--> header");
        }
        if let Some(body) = &request.body {
            let content_type = request.header("content-type");
            debug!(target: LOG_TARGET, body = %render_body(body, content_type), "--> body");
        }
        request
    }

    fn on_after_request(&self, response: &HttpResponse, _ctx: &ChainContext) -> Option<HttpResponse> {
        debug!(
            target: LOG_TARGET,
            status = response.status.as_u16(),
            reason = response.reason(),
            url = %response.url,
            from_cache = response.from_cache,
            "<-- response"
        );
        if !response.body.is_empty() {
            debug!(
                target: LOG_TARGET,
                body = %render_body(&response.body, response.content_type()),
                "<-- body"
            );
        }
        None
    }
}

fn is_textual(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.starts_with("text/")
            || ct.contains("json")
            || ct.contains("xml")
            || ct.contains("x-www-form-urlencoded")
    })
}

fn render_body(body: &[u8], content_type: Option<&str>) -> String {
    match std::str::from_utf8(body) {
        Ok(text) if is_textual(content_type) => decode_unicode_escapes(text),
        _ => format!("<{}-byte binary body>", body.len()),
    }
}

/// Replaces `\uXXXX` escapes with the characters they denote.
///
/// Surrogate pairs are combined; malformed escapes are kept verbatim.
pub fn decode_unicode_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        match parse_hex4(after) {
            Some(high @ 0xD800..=0xDBFF) => {
                let low = after
                    .get(4..)
                    .and_then(|s| s.strip_prefix("\\u"))
                    .and_then(parse_hex4)
                    .filter(|low| (0xDC00..=0xDFFF).contains(low));
                if let Some(low) = low {
                    let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                    rest = &after[10..];
                } else {
                    out.push_str("\\u");
                    rest = after;
                }
            }
            Some(code) => match char::from_u32(code) {
                Some(c) => {
                    out.push(c);
                    rest = &after[4..];
                }
                None => {
                    out.push_str("\\u");
                    rest = after;
                }
            },
            None => {
                out.push_str("\\u");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_hex4(s: &str) -> Option<u32> {
    let digits = s.get(..4)?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}
