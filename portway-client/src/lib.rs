// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

//! # Portway Client
//!
//! Per-endpoint HTTP clients, their request pipeline and asynchronous
//! dispatch.
//!
//! ## Registry
//!
//! - [`ClientRegistry`] - builds at most one client per base URL and hands
//!   out typed [`ServiceProxy`] values backed by it
//! - [`ConfigResolver`] - explicit > per-endpoint > global configuration
//! - [`NetworkConfig`] - the effective configuration for one endpoint
//! - [`RegistrySettings`] - registrations loaded from a JSON file
//!
//! ## Pipeline
//!
//! - [`interceptor`] - ordered request/response stages and built-ins
//! - [`converter`] - body conversion by [`ConverterMode`]
//! - [`transport`] - the network seam, backed by `reqwest`
//! - [`jar`] - cookie jar bridging a cookie store into the transport
//!
//! ## Failures and dispatch
//!
//! - [`ErrorClassifier`] - raw failures to [`ClassifiedError`](portway_core::ClassifiedError)
//! - [`Dispatcher`] - runs work on the runtime and delivers results on a
//!   dedicated callback thread
//! - [`LifecycleScope`] - cancels every request bound to it
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use portway_client::{
//!     ClientRegistry, Dispatcher, GetServiceOptions, NetworkConfig, ServiceProxy, TransportClient,
//! };
//!
//! struct UserApi(Arc<TransportClient>);
//!
//! impl ServiceProxy for UserApi {
//!     fn create(client: Arc<TransportClient>) -> Self {
//!         Self(client)
//!     }
//! }
//!
//! let registry = ClientRegistry::new();
//! registry.register_global(NetworkConfig::new("").with_default_log(true));
//!
//! let api = registry.get_service::<UserApi>("https://api.example.com/", GetServiceOptions::default())?;
//! let dispatcher = Dispatcher::current()?;
//! let scope = dispatcher.bind_scope(&window_lifecycle);
//! let client = Arc::clone(&api.0);
//! dispatcher.submit(&scope, async move { client.get("users/1").await }, handler);
//! ```

pub mod classify;
pub mod client;
pub mod config;
pub mod converter;
pub mod dispatch;
pub mod error;
pub mod interceptor;
pub mod jar;
pub mod lifecycle;
pub mod message;
pub mod probe;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod settings;
pub mod transport;

pub use classify::ErrorClassifier;
pub use client::TransportClient;
pub use config::{
    ConverterMode, CookieMode, DEFAULT_CACHE_MAX_AGE_SECS, DEFAULT_CACHE_MAX_STALE_SECS,
    DEFAULT_TIMEOUT_MS, NetworkConfig, Timeouts,
};
pub use converter::{BodyConverter, Converter};
pub use dispatch::{
    CALLBACK_THREAD_NAME, Dispatcher, Outcome, RequestHandle, RequestState, ResponseHandler,
};
pub use error::{CallError, ConfigError, DecodeError};
pub use interceptor::{ChainContext, Interceptor, InterceptorChain};
pub use jar::CookieJar;
pub use lifecycle::{Lifecycle, LifecycleScope, ManualLifecycle};
pub use message::{HttpRequest, HttpResponse};
pub use probe::{ConnectivityProbe, ProbeResult, ReachabilityProbe, StaticProbe};
pub use registry::{ClientRegistry, ClientRegistryBuilder, GetServiceOptions, ServiceProxy, parse_base_url};
pub use resolver::{ConfigResolver, ConfigSource};
pub use retry::RetryStrategy;
pub use settings::RegistrySettings;
pub use transport::{ReqwestTransport, Transport};
