//! The client registry.
//!
//! [`ClientRegistry`] builds at most one [`TransportClient`] per base URL
//! and hands out typed service proxies backed by it. It is an explicitly
//! constructed value, owned by application start-up and shared by
//! reference; nothing here is a process-wide static.
//!
//! ## Build order
//!
//! Interceptor stages are installed in a fixed order:
//!
//! 1. headers
//! 2. URL query parameters
//! 3. `custom_interceptors`
//! 4. `extra_interceptors`
//! 5. logging, if `print_default_log`
//! 6. cache control, if `enable_cache`
//!
//! ## Concurrency
//!
//! Each base URL has its own slot lock. Lookup and construction happen
//! under that lock, so concurrent first callers build exactly one client
//! while callers for other base URLs proceed in parallel.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use portway_core::CookieStore;
use portway_store::{
    DbCookieStore, DurableCookieStore, JsonFileKv, KeyValueStore, MemoryCookieStore,
    default_cookie_db_path, default_cookie_path,
};
use tracing::{debug, info, instrument};
use url::Url;

use crate::client::TransportClient;
use crate::config::{CookieMode, NetworkConfig};
use crate::converter::Converter;
use crate::error::ConfigError;
use crate::interceptor::{
    CacheInterceptor, DEFAULT_CACHE_CAPACITY_BYTES, HeadersInterceptor, InterceptorChain,
    LoggingInterceptor, ResponseCache, UrlParamsInterceptor,
};
use crate::jar::CookieJar;
use crate::probe::{ConnectivityProbe, ReachabilityProbe};
use crate::resolver::ConfigResolver;
use crate::retry::RetryStrategy;
use crate::transport::ReqwestTransport;

// ============================================================================
// Service Proxies
// ============================================================================

/// A typed API facade over a [`TransportClient`].
///
/// Implement this for each backend API; the registry creates one instance
/// per base URL and proxy type and caches it with the client.
pub trait ServiceProxy: Send + Sync + 'static {
    /// Creates the proxy over `client`.
    fn create(client: Arc<TransportClient>) -> Self;
}

/// Options for acquiring a service.
///
/// They only shape the first build for a base URL; later calls get the
/// cached client whatever they ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetServiceOptions {
    /// Attach a converter (requires a converter mode).
    pub use_converter: bool,
    /// Run each exchange on its own runtime task.
    pub use_async_adapter: bool,
    /// Attach a cookie jar.
    pub use_cookies: bool,
}

impl Default for GetServiceOptions {
    fn default() -> Self {
        Self {
            use_converter: true,
            use_async_adapter: true,
            use_cookies: true,
        }
    }
}

impl GetServiceOptions {
    /// Enables or disables the converter.
    #[must_use]
    pub fn with_converter(mut self, enabled: bool) -> Self {
        self.use_converter = enabled;
        self
    }

    /// Enables or disables the async adapter.
    #[must_use]
    pub fn with_async_adapter(mut self, enabled: bool) -> Self {
        self.use_async_adapter = enabled;
        self
    }

    /// Enables or disables cookies.
    #[must_use]
    pub fn with_cookies(mut self, enabled: bool) -> Self {
        self.use_cookies = enabled;
        self
    }
}

// ============================================================================
// Client Entries
// ============================================================================

type ProxyMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// One cached client and the proxies derived from it.
struct ClientEntry {
    client: Arc<TransportClient>,
    proxies: Mutex<ProxyMap>,
}

impl ClientEntry {
    fn proxy<T: ServiceProxy>(&self) -> Arc<T> {
        let mut proxies = lock(&self.proxies);
        if let Some(existing) = proxies
            .get(&TypeId::of::<T>())
            .and_then(|p| Arc::clone(p).downcast::<T>().ok())
        {
            return existing;
        }
        let proxy = Arc::new(T::create(Arc::clone(&self.client)));
        proxies.insert(TypeId::of::<T>(), Arc::clone(&proxy) as Arc<dyn Any + Send + Sync>);
        proxy
    }
}

type Slot = Arc<Mutex<Option<Arc<ClientEntry>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parses and validates a base URL.
///
/// The parsed form is the registry key, so `https://api.example.com` and
/// `https://api.example.com/` name the same endpoint.
pub fn parse_base_url(base_url: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidBaseUrl {
        base_url: base_url.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(invalid("base URL is empty"));
    }
    let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("base URL has no host"));
    }
    Ok(url)
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ClientRegistry`].
#[derive(Default)]
pub struct ClientRegistryBuilder {
    resolver: Option<ConfigResolver>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    cookie_kv: Option<Arc<dyn KeyValueStore>>,
    cookie_db_path: Option<PathBuf>,
    cache_capacity: Option<usize>,
}

impl ClientRegistryBuilder {
    /// Uses a pre-populated resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: ConfigResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sets the connectivity probe consulted by the cache stage.
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Sets the key-value store behind [`CookieMode::Persistent`].
    ///
    /// Defaults to a JSON file in the data directory.
    #[must_use]
    pub fn cookie_kv(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.cookie_kv = Some(kv);
        self
    }

    /// Sets the database file behind [`CookieMode::Db`].
    #[must_use]
    pub fn cookie_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_db_path = Some(path.into());
        self
    }

    /// Sets the response cache capacity, in body bytes, for each client.
    #[must_use]
    pub fn cache_capacity(mut self, bytes: usize) -> Self {
        self.cache_capacity = Some(bytes);
        self
    }

    /// Builds the registry.
    pub fn build(self) -> ClientRegistry {
        ClientRegistry {
            resolver: self.resolver.unwrap_or_default(),
            probe: self
                .probe
                .unwrap_or_else(|| Arc::new(ReachabilityProbe::new())),
            cookie_kv: self.cookie_kv,
            cookie_db_path: self.cookie_db_path,
            cache_capacity: self.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY_BYTES),
            slots: Mutex::new(HashMap::new()),
            resolved: RwLock::new(HashMap::new()),
            persistent_store: Mutex::new(None),
            db_store: Mutex::new(None),
            builds: AtomicUsize::new(0),
        }
    }
}

// ============================================================================
// Client Registry
// ============================================================================

/// Builds, caches and hands out per-endpoint clients.
pub struct ClientRegistry {
    resolver: ConfigResolver,
    probe: Arc<dyn ConnectivityProbe>,
    cookie_kv: Option<Arc<dyn KeyValueStore>>,
    cookie_db_path: Option<PathBuf>,
    cache_capacity: usize,
    slots: Mutex<HashMap<String, Slot>>,
    resolved: RwLock<HashMap<String, NetworkConfig>>,
    persistent_store: Mutex<Option<Arc<dyn CookieStore>>>,
    db_store: Mutex<Option<Arc<dyn CookieStore>>>,
    builds: AtomicUsize,
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("resolver", &self.resolver)
            .field("clients", &lock(&self.slots).len())
            .field("builds", &self.build_count())
            .finish_non_exhaustive()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientRegistry {
    /// Creates a registry with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a builder.
    pub fn builder() -> ClientRegistryBuilder {
        ClientRegistryBuilder::default()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers (or replaces) the global fallback configuration.
    pub fn register_global(&self, config: NetworkConfig) {
        self.resolver.register_global(config);
    }

    /// Registers (or replaces) the configuration for `base_url`.
    pub fn register_endpoint(&self, base_url: &str, config: NetworkConfig) -> Result<(), ConfigError> {
        let url = parse_base_url(base_url)?;
        self.resolver.register_endpoint(url.as_str(), config);
        Ok(())
    }

    /// Returns the resolver.
    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    // ========================================================================
    // Acquisition
    // ========================================================================

    /// Returns the service proxy for `base_url`, resolving its configuration.
    pub fn get_service<T: ServiceProxy>(
        &self,
        base_url: &str,
        opts: GetServiceOptions,
    ) -> Result<Arc<T>, ConfigError> {
        Ok(self.entry(base_url, opts, None)?.proxy::<T>())
    }

    /// Returns the service proxy for `base_url`, built from `config` if it
    /// is not cached yet.
    pub fn get_service_with<T: ServiceProxy>(
        &self,
        base_url: &str,
        opts: GetServiceOptions,
        config: &NetworkConfig,
    ) -> Result<Arc<T>, ConfigError> {
        Ok(self.entry(base_url, opts, Some(config))?.proxy::<T>())
    }

    /// Returns the transport client for `base_url`.
    pub fn client(
        &self,
        base_url: &str,
        opts: GetServiceOptions,
        config: Option<&NetworkConfig>,
    ) -> Result<Arc<TransportClient>, ConfigError> {
        Ok(Arc::clone(&self.entry(base_url, opts, config)?.client))
    }

    /// Returns the effective configuration a cached client was built from.
    pub fn resolved_config(&self, base_url: &str) -> Option<NetworkConfig> {
        let url = parse_base_url(base_url).ok()?;
        self.resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url.as_str())
            .cloned()
    }

    /// Returns the base URLs with a cached client, sorted.
    pub fn cached_base_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = lock(&self.slots)
            .iter()
            .filter(|(_, slot)| lock(slot).is_some())
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }

    /// Drops every cached client, proxy and resolved configuration.
    ///
    /// Registrations and opened cookie stores are kept.
    pub fn clear_cache(&self) {
        let mut slots = lock(&self.slots);
        let mut resolved = self.resolved.write().unwrap_or_else(PoisonError::into_inner);
        info!(clients = slots.len(), "Clearing client cache");
        slots.clear();
        resolved.clear();
    }

    /// Returns how many clients have been built so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn entry(
        &self,
        base_url: &str,
        opts: GetServiceOptions,
        explicit: Option<&NetworkConfig>,
    ) -> Result<Arc<ClientEntry>, ConfigError> {
        let url = parse_base_url(base_url)?;
        let key = url.as_str().to_string();

        let slot: Slot = Arc::clone(lock(&self.slots).entry(key.clone()).or_default());
        let mut guard = lock(&slot);
        if let Some(entry) = guard.as_ref() {
            return Ok(Arc::clone(entry));
        }

        let (client, config) = self.build_client(&url, opts, explicit)?;
        let entry = Arc::new(ClientEntry {
            client: Arc::new(client),
            proxies: Mutex::new(HashMap::new()),
        });
        *guard = Some(Arc::clone(&entry));
        drop(guard);

        // Same lock order as `clear_cache`. A slot cleared mid-build is no
        // longer in the map; its config must not outlive it.
        let slots = lock(&self.slots);
        if slots.get(&key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
            self.resolved
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, config);
        } else {
            debug!(base_url = %key, "Cache cleared during build; not caching config");
        }
        Ok(entry)
    }

    // ========================================================================
    // Construction
    // ========================================================================

    #[instrument(skip(self, explicit), fields(base_url = %base_url))]
    fn build_client(
        &self,
        base_url: &Url,
        opts: GetServiceOptions,
        explicit: Option<&NetworkConfig>,
    ) -> Result<(TransportClient, NetworkConfig), ConfigError> {
        let config = self.resolver.resolve(base_url.as_str(), explicit)?;

        let converter = if opts.use_converter {
            Some(Converter::select(config.converter_mode, config.custom_converter.as_ref())?)
        } else {
            None
        };

        let cookie_jar = if opts.use_cookies {
            Some(Arc::new(CookieJar::new(self.cookie_store_for(&config)?)))
        } else {
            None
        };

        let retry = RetryStrategy::for_connect_failures(config.retry_on_connect_failure);
        let transport = ReqwestTransport::new(config.timeouts(), retry, cookie_jar.clone())?;
        let (chain, response_cache) = self.build_chain(&config)?;

        let mut client = TransportClient::new(
            base_url.clone(),
            config.clone(),
            Arc::new(transport),
            chain,
            Arc::clone(&self.probe),
        )
        .with_async_adapter(opts.use_async_adapter);
        if let Some(converter) = converter {
            client = client.with_converter(converter);
        }
        if let Some(jar) = cookie_jar {
            client = client.with_cookie_jar(jar);
        }
        if let Some(cache) = response_cache {
            client = client.with_response_cache(cache);
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        info!(stages = ?client.stage_names(), "Built transport client");
        Ok((client, config))
    }

    fn build_chain(
        &self,
        config: &NetworkConfig,
    ) -> Result<(InterceptorChain, Option<Arc<ResponseCache>>), ConfigError> {
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(HeadersInterceptor::new(&config.headers)?));
        chain.push(Arc::new(UrlParamsInterceptor::new(&config.url_params)));
        for stage in config.custom_interceptors.iter().chain(&config.extra_interceptors) {
            chain.push(Arc::clone(stage));
        }
        if config.print_default_log {
            chain.push(Arc::new(LoggingInterceptor::new()));
        }

        let mut response_cache = None;
        if config.enable_cache {
            let cache = Arc::new(ResponseCache::new(self.cache_capacity));
            chain.push(Arc::new(CacheInterceptor::new(
                config.effective_max_age_secs(),
                config.effective_max_stale_secs(),
                Arc::clone(&cache),
            )));
            response_cache = Some(cache);
        }
        Ok((chain, response_cache))
    }

    fn cookie_store_for(&self, config: &NetworkConfig) -> Result<Arc<dyn CookieStore>, ConfigError> {
        match config.cookie_mode.unwrap_or_default() {
            CookieMode::Memory => Ok(Arc::new(MemoryCookieStore::new())),
            CookieMode::Persistent => self.persistent_store(),
            CookieMode::Db => self.db_store(),
            CookieMode::Custom => config
                .custom_cookie_store
                .clone()
                .ok_or(ConfigError::MissingCustomCookieStore),
        }
    }

    fn persistent_store(&self) -> Result<Arc<dyn CookieStore>, ConfigError> {
        let mut slot = lock(&self.persistent_store);
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }
        let kv: Arc<dyn KeyValueStore> = match &self.cookie_kv {
            Some(kv) => Arc::clone(kv),
            None => {
                let path = default_cookie_path();
                debug!(path = %path.display(), "Opening durable cookie file");
                Arc::new(JsonFileKv::open(path).map_err(|e| ConfigError::CookieStore(e.to_string()))?)
            }
        };
        let store: Arc<dyn CookieStore> = Arc::new(DurableCookieStore::open(kv));
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    fn db_store(&self) -> Result<Arc<dyn CookieStore>, ConfigError> {
        let mut slot = lock(&self.db_store);
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }
        let path = self
            .cookie_db_path
            .clone()
            .unwrap_or_else(default_cookie_db_path);
        debug!(path = %path.display(), "Opening cookie database");
        let store: Arc<dyn CookieStore> =
            Arc::new(DbCookieStore::open(&path).map_err(|e| ConfigError::CookieStore(e.to_string()))?);
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }
}
