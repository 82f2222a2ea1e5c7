//! Network configuration.
//!
//! [`NetworkConfig`] is the effective configuration for one endpoint. It is
//! plain data plus a few optional handles (custom stages, converter, cookie
//! store) that cannot be serialized and are skipped when the configuration
//! is read from or written to disk.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use portway_core::CookieStore;
use serde::{Deserialize, Serialize};

use crate::converter::BodyConverter;
use crate::interceptor::Interceptor;

/// Default connect/read/write timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 40_000;

/// Default `max-age` for cached responses while online, in seconds.
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 3_600;

/// Default `max-stale` for cached responses while offline, in seconds.
pub const DEFAULT_CACHE_MAX_STALE_SECS: u64 = 86_400;

// ============================================================================
// Modes
// ============================================================================

/// How response bodies are converted into typed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConverterMode {
    /// JSON.
    Gson,
    /// JSON.
    Jackson,
    /// Plain text scalars.
    Scalars,
    /// JSON.
    Moshi,
    /// XML.
    SimpleXml,
    /// Protocol buffers (Wire schemas); needs a custom converter.
    Wire,
    /// Protocol buffers; needs a custom converter.
    Protobuf,
    /// XML.
    Jaxb,
    /// JSON where an empty body means "absent".
    Java8,
    /// JSON where an empty body means "absent".
    Guava,
    /// Caller-supplied converter.
    Custom,
}

impl fmt::Display for ConverterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gson => "GSON",
            Self::Jackson => "JACKSON",
            Self::Scalars => "SCALARS",
            Self::Moshi => "MOSHI",
            Self::SimpleXml => "SIMPLE_XML",
            Self::Wire => "WIRE",
            Self::Protobuf => "PROTOBUF",
            Self::Jaxb => "JAXB",
            Self::Java8 => "JAVA8",
            Self::Guava => "GUAVA",
            Self::Custom => "CUSTOM",
        };
        f.write_str(name)
    }
}

/// Where cookies are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CookieMode {
    /// In process memory, one store per client.
    #[default]
    Memory,
    /// Durable key-value storage shared by the registry.
    Persistent,
    /// SQLite database shared by the registry.
    Db,
    /// Caller-supplied store.
    Custom,
}

impl fmt::Display for CookieMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "MEMORY",
            Self::Persistent => "PERSISTENT",
            Self::Db => "DB",
            Self::Custom => "CUSTOM",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Timeouts
// ============================================================================

/// Effective transport timeouts, with zeros replaced by the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP + TLS connect timeout.
    pub connect: Duration,
    /// Per-read timeout.
    pub read: Duration,
    /// Write timeout.
    pub write: Duration,
}

impl Timeouts {
    /// Upper bound for one whole exchange.
    ///
    /// The transport has no separate write timeout, so the write budget is
    /// folded into this total.
    pub fn total(&self) -> Duration {
        self.connect + self.read + self.write
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        let d = Duration::from_millis(DEFAULT_TIMEOUT_MS);
        Self {
            connect: d,
            read: d,
            write: d,
        }
    }
}

fn or_default(value: u64, default: u64) -> u64 {
    if value == 0 { default } else { value }
}

// ============================================================================
// NetworkConfig
// ============================================================================

/// Effective networking configuration for one endpoint.
///
/// Zero-valued timeouts and cache ages mean "use the default".
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL; filled in from the requested endpoint when empty.
    pub base_url: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds.
    pub write_timeout_ms: u64,
    /// Retry once when the connection cannot be established.
    pub retry_on_connect_failure: bool,
    /// Install the cache-control stage and response cache.
    pub enable_cache: bool,
    /// `max-age` while online, in seconds.
    pub cache_max_age_secs: u64,
    /// `max-stale` while offline, in seconds.
    pub cache_max_stale_secs: u64,
    /// Headers added to every request.
    pub headers: BTreeMap<String, String>,
    /// Query parameters appended to every request.
    pub url_params: BTreeMap<String, String>,
    /// Body conversion mode.
    pub converter_mode: Option<ConverterMode>,
    /// Converter used by [`ConverterMode::Custom`].
    #[serde(skip)]
    pub custom_converter: Option<Arc<dyn BodyConverter>>,
    /// Cookie persistence mode.
    pub cookie_mode: Option<CookieMode>,
    /// Store used by [`CookieMode::Custom`].
    #[serde(skip)]
    pub custom_cookie_store: Option<Arc<dyn CookieStore>>,
    /// Caller stages, run after the built-in header and query stages.
    #[serde(skip)]
    pub custom_interceptors: Vec<Arc<dyn Interceptor>>,
    /// Additional caller stages, run after `custom_interceptors`.
    #[serde(skip)]
    pub extra_interceptors: Vec<Arc<dyn Interceptor>>,
    /// Install the request/response logging stage.
    pub print_default_log: bool,
}

impl NetworkConfig {
    /// Creates a JSON configuration for `base_url` with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            converter_mode: Some(ConverterMode::Gson),
            ..Self::default()
        }
    }

    /// Sets all three timeouts.
    #[must_use]
    pub fn with_timeouts_ms(mut self, connect: u64, read: u64, write: u64) -> Self {
        self.connect_timeout_ms = connect;
        self.read_timeout_ms = read;
        self.write_timeout_ms = write;
        self
    }

    /// Enables or disables retry on connect failure.
    #[must_use]
    pub fn with_retry_on_connect_failure(mut self, enabled: bool) -> Self {
        self.retry_on_connect_failure = enabled;
        self
    }

    /// Enables the response cache with the given ages (0 = default).
    #[must_use]
    pub fn with_cache(mut self, max_age_secs: u64, max_stale_secs: u64) -> Self {
        self.enable_cache = true;
        self.cache_max_age_secs = max_age_secs;
        self.cache_max_stale_secs = max_stale_secs;
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a query parameter appended to every request.
    #[must_use]
    pub fn with_url_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.url_params.insert(name.into(), value.into());
        self
    }

    /// Sets the converter mode.
    #[must_use]
    pub fn with_converter_mode(mut self, mode: Option<ConverterMode>) -> Self {
        self.converter_mode = mode;
        self
    }

    /// Selects a custom converter.
    #[must_use]
    pub fn with_custom_converter(mut self, converter: Arc<dyn BodyConverter>) -> Self {
        self.converter_mode = Some(ConverterMode::Custom);
        self.custom_converter = Some(converter);
        self
    }

    /// Sets the cookie mode.
    #[must_use]
    pub fn with_cookie_mode(mut self, mode: CookieMode) -> Self {
        self.cookie_mode = Some(mode);
        self
    }

    /// Selects a custom cookie store.
    #[must_use]
    pub fn with_custom_cookie_store(mut self, store: Arc<dyn CookieStore>) -> Self {
        self.cookie_mode = Some(CookieMode::Custom);
        self.custom_cookie_store = Some(store);
        self
    }

    /// Appends a caller stage.
    #[must_use]
    pub fn with_interceptor(mut self, stage: Arc<dyn Interceptor>) -> Self {
        self.custom_interceptors.push(stage);
        self
    }

    /// Appends an out-of-band caller stage, run after all `with_interceptor` stages.
    #[must_use]
    pub fn with_extra_interceptor(mut self, stage: Arc<dyn Interceptor>) -> Self {
        self.extra_interceptors.push(stage);
        self
    }

    /// Enables the logging stage.
    #[must_use]
    pub fn with_default_log(mut self, enabled: bool) -> Self {
        self.print_default_log = enabled;
        self
    }

    /// Returns the timeouts with defaults applied.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(or_default(self.connect_timeout_ms, DEFAULT_TIMEOUT_MS)),
            read: Duration::from_millis(or_default(self.read_timeout_ms, DEFAULT_TIMEOUT_MS)),
            write: Duration::from_millis(or_default(self.write_timeout_ms, DEFAULT_TIMEOUT_MS)),
        }
    }

    /// Returns `max-age` in seconds with the default applied.
    pub fn effective_max_age_secs(&self) -> u64 {
        or_default(self.cache_max_age_secs, DEFAULT_CACHE_MAX_AGE_SECS)
    }

    /// Returns `max-stale` in seconds with the default applied.
    pub fn effective_max_stale_secs(&self) -> u64 {
        or_default(self.cache_max_stale_secs, DEFAULT_CACHE_MAX_STALE_SECS)
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("base_url", &self.base_url)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("write_timeout_ms", &self.write_timeout_ms)
            .field("retry_on_connect_failure", &self.retry_on_connect_failure)
            .field("enable_cache", &self.enable_cache)
            .field("cache_max_age_secs", &self.cache_max_age_secs)
            .field("cache_max_stale_secs", &self.cache_max_stale_secs)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("url_params", &self.url_params)
            .field("converter_mode", &self.converter_mode)
            .field("custom_converter", &self.custom_converter.is_some())
            .field("cookie_mode", &self.cookie_mode)
            .field("custom_cookie_store", &self.custom_cookie_store.is_some())
            .field("custom_interceptors", &self.custom_interceptors.len())
            .field("extra_interceptors", &self.extra_interceptors.len())
            .field("print_default_log", &self.print_default_log)
            .finish()
    }
}
