//! The per-endpoint transport client.
//!
//! A [`TransportClient`] owns everything one base URL needs: the pooled
//! transport, the interceptor chain, the converter and the cookie jar. It
//! is immutable once built and safe to share across any number of
//! in-flight requests.

use std::sync::Arc;

use portway_core::CookieStore;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::config::{NetworkConfig, Timeouts};
use crate::converter::Converter;
use crate::error::{CallError, ConfigError};
use crate::interceptor::{ChainContext, InterceptorChain, ResponseCache};
use crate::jar::CookieJar;
use crate::message::{HttpRequest, HttpResponse};
use crate::probe::ConnectivityProbe;
use crate::transport::Transport;

/// A built client for one base URL.
pub struct TransportClient {
    base_url: Url,
    config: NetworkConfig,
    transport: Arc<dyn Transport>,
    chain: Arc<InterceptorChain>,
    probe: Arc<dyn ConnectivityProbe>,
    converter: Option<Converter>,
    cookie_jar: Option<Arc<CookieJar>>,
    response_cache: Option<Arc<ResponseCache>>,
    async_adapter: bool,
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("base_url", &self.base_url.as_str())
            .field("stages", &self.chain.names())
            .field("converter", &self.converter)
            .field("cookies", &self.cookie_jar.as_ref().map(|j| j.store().name()))
            .field("async_adapter", &self.async_adapter)
            .finish_non_exhaustive()
    }
}

impl TransportClient {
    /// Creates a client without converter, cookie jar or cache.
    pub fn new(
        base_url: Url,
        config: NetworkConfig,
        transport: Arc<dyn Transport>,
        chain: InterceptorChain,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            base_url,
            config,
            transport,
            chain: Arc::new(chain),
            probe,
            converter: None,
            cookie_jar: None,
            response_cache: None,
            async_adapter: false,
        }
    }

    /// Attaches a converter.
    #[must_use]
    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Attaches the cookie jar wired into the transport.
    #[must_use]
    pub fn with_cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Records the response cache behind the cache stage.
    #[must_use]
    pub fn with_response_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.response_cache = Some(cache);
        self
    }

    /// Runs every exchange on its own runtime task.
    #[must_use]
    pub fn with_async_adapter(mut self, enabled: bool) -> Self {
        self.async_adapter = enabled;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the effective configuration this client was built from.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Returns the effective timeouts.
    pub fn timeouts(&self) -> Timeouts {
        self.config.timeouts()
    }

    /// Returns the stage names in execution order.
    pub fn stage_names(&self) -> Vec<String> {
        self.chain.names().into_iter().map(str::to_string).collect()
    }

    /// Returns the converter, if conversion is enabled.
    pub fn converter(&self) -> Option<&Converter> {
        self.converter.as_ref()
    }

    /// Returns the cookie store, if cookies are enabled.
    pub fn cookie_store(&self) -> Option<&Arc<dyn CookieStore>> {
        self.cookie_jar.as_ref().map(|jar| jar.store())
    }

    /// Returns the response cache, if caching is enabled.
    pub fn response_cache(&self) -> Option<&Arc<ResponseCache>> {
        self.response_cache.as_ref()
    }

    /// Returns true if exchanges run on their own task.
    pub fn uses_async_adapter(&self) -> bool {
        self.async_adapter
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Resolves `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url, CallError> {
        self.base_url
            .join(path)
            .map_err(|e| CallError::InvalidRequest(format!("{path:?}: {e}")))
    }

    /// Builds a request for `path`.
    pub fn request(&self, method: Method, path: &str) -> Result<HttpRequest, CallError> {
        Ok(HttpRequest::new(method, self.url(path)?))
    }

    /// Runs `request` through the interceptor chain and the transport.
    ///
    /// Connectivity is probed first when caching is enabled, so the cache
    /// stage can choose between network and cache.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, CallError> {
        let exchange = Exchange {
            base_url: self.base_url.clone(),
            probe_connectivity: self.config.enable_cache,
            transport: Arc::clone(&self.transport),
            chain: Arc::clone(&self.chain),
            probe: Arc::clone(&self.probe),
        };

        if self.async_adapter {
            tokio::spawn(exchange.run(request))
                .await
                .map_err(CallError::other)?
        } else {
            exchange.run(request).await
        }
    }

    /// Executes `request` and decodes a successful body into `T`.
    pub async fn call<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, CallError> {
        let response = self.execute(request).await?;
        if !response.is_success() {
            return Err(CallError::Status {
                status: response.status.as_u16(),
                reason: response.reason().to_string(),
            });
        }
        let converter = self.converter.as_ref().ok_or(ConfigError::MissingConverterMode)?;
        Ok(converter.decode(&response.body)?)
    }

    /// GETs `path` and decodes the body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CallError> {
        self.call(self.request(Method::GET, path)?).await
    }

    /// POSTs `body` to `path` and decodes the response body.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, CallError> {
        let converter = self.converter.as_ref().ok_or(ConfigError::MissingConverterMode)?;
        let encoded = converter.encode(body)?;
        let request = self
            .request(Method::POST, path)?
            .with_body(encoded, converter.content_type());
        self.call(request).await
    }
}

/// Everything one exchange needs, detached from the client so it can run
/// on another task.
struct Exchange {
    base_url: Url,
    probe_connectivity: bool,
    transport: Arc<dyn Transport>,
    chain: Arc<InterceptorChain>,
    probe: Arc<dyn ConnectivityProbe>,
}

impl Exchange {
    async fn run(self, request: HttpRequest) -> Result<HttpResponse, CallError> {
        let connected = if self.probe_connectivity {
            self.probe.is_connected(&self.base_url).await
        } else {
            true
        };
        let ctx = ChainContext::new(self.base_url.as_str(), connected);
        let response = self.chain.proceed(request, &ctx, self.transport.as_ref()).await?;
        debug!(status = %response.status, from_cache = response.from_cache, "Exchange finished");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticProbe;
    use crate::transport::testing::EchoTransport;
    use portway_core::ErrorKind;
    use reqwest::StatusCode;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Item {
        id: u32,
    }

    fn client(transport: EchoTransport) -> TransportClient {
        TransportClient::new(
            "https://api.example.com/v1/".parse().unwrap(),
            NetworkConfig::new("https://api.example.com/v1/"),
            Arc::new(transport),
            InterceptorChain::new(),
            Arc::new(StaticProbe::online()),
        )
    }

    #[test]
    fn test_paths_resolve_against_base() {
        let client = client(EchoTransport::default());
        assert_eq!(client.url("items/1").unwrap().as_str(), "https://api.example.com/v1/items/1");
        assert_eq!(client.url("/root").unwrap().as_str(), "https://api.example.com/root");
    }

    #[tokio::test]
    async fn test_get_decodes_body() {
        let client = client(EchoTransport::with_body(StatusCode::OK, r#"{"id":7}"#))
            .with_converter(Converter::Json)
            .with_async_adapter(true);
        let item: Item = client.get("items/7").await.unwrap();
        assert_eq!(item.id, 7);
    }

    #[tokio::test]
    async fn test_non_success_is_status_error() {
        let client = client(EchoTransport::with_body(StatusCode::NOT_FOUND, "missing"))
            .with_converter(Converter::Json);
        let err = client.get::<Item>("items/8").await.unwrap_err();
        assert!(matches!(err, CallError::Status { status: 404, .. }));
        assert_eq!(crate::ErrorClassifier::classify(err).kind(), ErrorKind::HttpStatus);
    }

    #[tokio::test]
    async fn test_decoding_without_converter_fails() {
        let client = client(EchoTransport::with_body(StatusCode::OK, "{}"));
        let err = client.get::<serde_json::Value>("x").await.unwrap_err();
        assert!(matches!(err, CallError::Config(ConfigError::MissingConverterMode)));
    }
}
