//! Ordered request/response stages around the transport call.
//!
//! ## Order
//!
//! The chain calls [`Interceptor::on_before_request`] on every stage in
//! registration order, sends the (possibly rewritten) request, then calls
//! [`Interceptor::on_after_request`] on every stage in the same order.
//! Stages never run in parallel.
//!
//! ## Short-circuit
//!
//! Only a stage that overrides [`Interceptor::cached_response`] may answer
//! without the network; the built-in [`CacheInterceptor`] does so while the
//! device is offline.
//!
//! ## Built-in stages
//!
//! - [`HeadersInterceptor`] - adds configured headers
//! - [`UrlParamsInterceptor`] - appends configured query parameters
//! - [`LoggingInterceptor`] - logs requests and responses
//! - [`CacheInterceptor`] - cache-control annotation and offline cache

mod cache;
mod headers;
mod logging;

pub use cache::{CacheInterceptor, DEFAULT_CACHE_CAPACITY_BYTES, ResponseCache};
pub use headers::{HeadersInterceptor, UrlParamsInterceptor};
pub use logging::{LOG_TARGET, LoggingInterceptor};

use std::sync::Arc;

use tracing::trace;

use crate::error::CallError;
use crate::message::{HttpRequest, HttpResponse};
use crate::transport::Transport;

// ============================================================================
// Chain Context
// ============================================================================

/// Per-call facts shared by every stage.
#[derive(Debug, Clone)]
pub struct ChainContext {
    /// Base URL of the client running the chain.
    pub base_url: String,
    /// Connectivity as probed right before the call.
    pub connected: bool,
}

impl ChainContext {
    /// Creates a context.
    pub fn new(base_url: impl Into<String>, connected: bool) -> Self {
        Self {
            base_url: base_url.into(),
            connected,
        }
    }
}

// ============================================================================
// Interceptor
// ============================================================================

/// One request/response transformation stage.
///
/// Both hooks default to "no change", so a stage implements only what it
/// needs.
pub trait Interceptor: Send + Sync {
    /// Stage name, used in logs.
    fn name(&self) -> &str;

    /// Rewrites the outbound request.
    fn on_before_request(&self, request: HttpRequest, _ctx: &ChainContext) -> HttpRequest {
        request
    }

    /// Rewrites the response. `None` keeps the response unchanged.
    fn on_after_request(&self, _response: &HttpResponse, _ctx: &ChainContext) -> Option<HttpResponse> {
        None
    }

    /// Answers the request without the network.
    fn cached_response(&self, _request: &HttpRequest, _ctx: &ChainContext) -> Option<HttpResponse> {
        None
    }
}

// ============================================================================
// Interceptor Chain
// ============================================================================

/// An ordered list of stages.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    stages: Vec<Arc<dyn Interceptor>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("stages", &self.names())
            .finish()
    }
}

impl InterceptorChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain from stages in order.
    pub fn with_stages(stages: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { stages }
    }

    /// Appends a stage.
    pub fn push(&mut self, stage: Arc<dyn Interceptor>) {
        self.stages.push(stage);
    }

    /// Returns the stage names in order.
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs `request` through every stage and the transport.
    ///
    /// Transport failures skip the response pass and propagate unchanged.
    pub async fn proceed(
        &self,
        mut request: HttpRequest,
        ctx: &ChainContext,
        transport: &dyn Transport,
    ) -> Result<HttpResponse, CallError> {
        for stage in &self.stages {
            trace!(stage = stage.name(), "Before request");
            request = stage.on_before_request(request, ctx);
        }

        let cached = self
            .stages
            .iter()
            .find_map(|stage| stage.cached_response(&request, ctx));
        let mut response = match cached {
            Some(response) => response,
            None => transport.send(request).await?,
        };

        for stage in &self.stages {
            trace!(stage = stage.name(), "After request");
            if let Some(rewritten) = stage.on_after_request(&response, ctx) {
                response = rewritten;
            }
        }
        Ok(response)
    }
}

// ============================================================================
// Tests
// ============================================================================
