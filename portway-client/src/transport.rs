//! The network seam.
//!
//! [`Transport`] sends one fully built request and reads the whole
//! response. [`ReqwestTransport`] is the production implementation: one
//! pooled `reqwest::Client` per base URL, with the configured timeouts,
//! optional cookie jar and connect-failure retry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::Timeouts;
use crate::error::{CallError, ConfigError};
use crate::jar::CookieJar;
use crate::message::{HttpRequest, HttpResponse};
use crate::retry::RetryStrategy;

/// User agent string for Portway.
const USER_AGENT: &str = concat!("portway/", env!("CARGO_PKG_VERSION"));

/// Sends requests over the network.
///
/// Implementations must be safe for unsynchronized concurrent use.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and reads the complete response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CallError>;
}

// ============================================================================
// ReqwestTransport
// ============================================================================

/// Transport backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
    retry_strategy: RetryStrategy,
}

impl ReqwestTransport {
    /// Builds the client.
    pub fn new(
        timeouts: Timeouts,
        retry_strategy: RetryStrategy,
        cookie_jar: Option<Arc<CookieJar>>,
    ) -> Result<Self, ConfigError> {
        let has_cookie_jar = cookie_jar.is_some();
        let mut builder = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .timeout(timeouts.total())
            .user_agent(USER_AGENT);
        if let Some(jar) = cookie_jar {
            builder = builder.cookie_provider(jar);
        }
        let inner = builder
            .build()
            .map_err(|e| ConfigError::Transport(e.to_string()))?;

        debug!(
            connect_ms = timeouts.connect.as_millis(),
            read_ms = timeouts.read.as_millis(),
            write_ms = timeouts.write.as_millis(),
            max_attempts = retry_strategy.max_attempts,
            cookies = has_cookie_jar,
            "Built HTTP transport"
        );
        Ok(Self {
            inner,
            retry_strategy,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CallError> {
        let response = self
            .retry_strategy
            .run(|| {
                let mut builder = self
                    .inner
                    .request(request.method.clone(), request.url.clone())
                    .headers(request.headers.clone());
                if let Some(body) = &request.body {
                    builder = builder.body(body.clone());
                }
                builder.send()
            })
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!(status = %status, "Response received");
        let body = response.bytes().await?;
        Ok(HttpResponse {
            status,
            headers,
            body,
            url: request.url,
            method: request.method,
            from_cache: false,
        })
    }
}

// ============================================================================
// Test doubles
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use reqwest::StatusCode;

    use super::*;

    /// Answers every request with a fixed status and body, echoing the
    /// request headers back as response headers.
    #[derive(Debug)]
    pub(crate) struct EchoTransport {
        status: StatusCode,
        body: &'static str,
        calls: AtomicUsize,
    }

    impl Default for EchoTransport {
        fn default() -> Self {
            Self::with_body(StatusCode::OK, "")
        }
    }

    impl EchoTransport {
        pub(crate) fn with_body(status: StatusCode, body: &'static str) -> Self {
            Self {
                status,
                body,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut response =
                HttpResponse::new(self.status, request.url, self.body).with_method(request.method);
            response.headers = request.headers;
            Ok(response)
        }
    }
}
