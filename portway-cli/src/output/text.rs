//! Text output formatting with colors.

use chrono::Local;
use portway_client::HttpResponse;
use portway_core::{ClassifiedError, Cookie};

use super::json::{ConfigOutput, expiry};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
    show_headers: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self {
            use_colors,
            show_headers: false,
        }
    }

    /// Include response headers in [`format_response`](Self::format_response).
    pub fn with_headers(mut self, show: bool) -> Self {
        self.show_headers = show;
        self
    }

    /// Formats a response: a status line, optional headers, then the body.
    pub fn format_response(&self, response: &HttpResponse) -> String {
        let mut lines = Vec::new();

        let status = format!("{} {}", response.status.as_u16(), response.reason());
        let mut head = format!(
            "{} {} {}",
            self.bold(response.method.as_str()),
            response.url,
            self.color_for_status(response.status.as_u16(), &status)
        );
        if response.from_cache {
            head.push(' ');
            head.push_str(&self.dim("(cached)"));
        }
        lines.push(head);

        if self.show_headers {
            for (name, value) in &response.headers {
                lines.push(format!(
                    "{}: {}",
                    self.cyan(name.as_str()),
                    value.to_str().unwrap_or("<binary>")
                ));
            }
        }

        lines.push(String::new());
        lines.push(self.format_body(&response.body));

        lines.join("\n")
    }

    /// Formats a body, pretty-printing it when it is JSON.
    pub fn format_body(&self, body: &[u8]) -> String {
        if body.is_empty() {
            return self.dim("(empty body)");
        }
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(value) => serde_json::to_string_pretty(&value)
                .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned()),
            Err(_) => String::from_utf8_lossy(body).into_owned(),
        }
    }

    /// Formats a cookie listing grouped by domain.
    pub fn format_cookies(&self, cookies: &[Cookie]) -> String {
        if cookies.is_empty() {
            return self.dim("No cookies stored");
        }

        let mut sorted: Vec<&Cookie> = cookies.iter().collect();
        sorted.sort_by(|a, b| a.domain.cmp(&b.domain).then_with(|| a.name.cmp(&b.name)));

        let mut lines = Vec::new();
        let mut current: Option<&str> = None;
        for cookie in sorted {
            if current != Some(cookie.domain.as_str()) {
                if current.is_some() {
                    lines.push(String::new());
                }
                lines.push(self.bold(&cookie.domain));
                current = Some(cookie.domain.as_str());
            }

            let expires = expiry(cookie).map_or_else(
                || "session".to_string(),
                |dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
            );
            let mut flags = Vec::new();
            if cookie.secure {
                flags.push("secure");
            }
            if cookie.http_only {
                flags.push("httponly");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(","))
            };

            lines.push(format!(
                "  {}={} {} {}{}",
                cookie.name,
                cookie.value,
                self.dim(&cookie.path),
                self.dim(&expires),
                flags
            ));
        }

        lines.join("\n")
    }

    /// Formats an effective configuration.
    pub fn format_config(&self, config: &ConfigOutput) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{} {}",
            self.bold(&config.base_url),
            self.dim(&format!("({})", config.source))
        ));
        lines.push("─".repeat(40));
        lines.push(format!(
            "Timeouts (ms):  connect {}, read {}, write {}",
            config.connect_timeout_ms, config.read_timeout_ms, config.write_timeout_ms
        ));
        lines.push(format!("Retry connect:  {}", config.retry_on_connect_failure));
        if config.enable_cache {
            lines.push(format!(
                "Cache:          max-age {}s, max-stale {}s",
                config.cache_max_age_secs, config.cache_max_stale_secs
            ));
        } else {
            lines.push("Cache:          disabled".to_string());
        }
        lines.push(format!(
            "Converter:      {}",
            config.converter_mode.as_deref().unwrap_or("none")
        ));
        lines.push(format!("Cookies:        {}", config.cookie_mode));
        lines.push(format!("Request log:    {}", config.print_default_log));

        if !config.headers.is_empty() {
            lines.push(String::new());
            lines.push(self.dim("Headers:"));
            for (name, value) in &config.headers {
                lines.push(format!("  {name}: {value}"));
            }
        }
        if !config.url_params.is_empty() {
            lines.push(String::new());
            lines.push(self.dim("Query parameters:"));
            for (name, value) in &config.url_params {
                lines.push(format!("  {name}={value}"));
            }
        }

        lines.join("\n")
    }

    /// Formats a classified failure.
    pub fn format_error(&self, error: &ClassifiedError) -> String {
        let mut line = format!(
            "{} [{} {}] {}",
            self.red("Error"),
            error.kind(),
            error.code(),
            error.message()
        );
        if let Some(cause) = error.cause() {
            line.push('\n');
            line.push_str(&self.dim(&format!("  caused by: {cause}")));
        }
        line
    }

    // ========================================================================
    // Color/style helpers
    // ========================================================================

    fn color_for_status(&self, status: u16, text: &str) -> String {
        match status {
            200..=299 => self.green(text),
            300..=399 => self.yellow(text),
            _ => self.red(text),
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}
