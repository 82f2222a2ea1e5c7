//! Three-tier configuration lookup.
//!
//! Resolution order, first match wins:
//!
//! 1. a configuration passed explicitly by the caller
//! 2. a configuration registered for that exact base URL
//! 3. the process-wide global configuration
//!
//! Registrations are last-write-wins.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::ConfigError;

/// Where a resolved configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Passed by the caller.
    Explicit,
    /// Registered for the endpoint.
    Endpoint,
    /// The global fallback.
    Global,
}

impl ConfigSource {
    /// Returns a short stable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Endpoint => "endpoint",
            Self::Global => "global",
        }
    }
}

/// Registered configurations and the lookup over them.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    global: RwLock<Option<NetworkConfig>>,
    endpoints: RwLock<HashMap<String, NetworkConfig>>,
}

impl ConfigResolver {
    /// Creates a resolver with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the global configuration.
    pub fn register_global(&self, config: NetworkConfig) {
        debug!("Registering global network configuration");
        *self.global.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
    }

    /// Registers (or replaces) the configuration for `base_url`.
    pub fn register_endpoint(&self, base_url: impl Into<String>, config: NetworkConfig) {
        let base_url = base_url.into();
        debug!(base_url = %base_url, "Registering endpoint network configuration");
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(base_url, config);
    }

    /// Returns true if a global configuration is registered.
    pub fn has_global(&self) -> bool {
        self.global
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns the base URLs with an endpoint registration, sorted.
    pub fn registered_endpoints(&self) -> Vec<String> {
        let mut urls: Vec<_> = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        urls.sort();
        urls
    }

    /// Resolves the effective configuration for `base_url`.
    ///
    /// The returned configuration always carries `base_url`.
    pub fn resolve(
        &self,
        base_url: &str,
        explicit: Option<&NetworkConfig>,
    ) -> Result<NetworkConfig, ConfigError> {
        let (mut config, source) = self.lookup(base_url, explicit).ok_or_else(|| {
            ConfigError::NotRegistered {
                base_url: base_url.to_string(),
            }
        })?;
        debug!(base_url, source = ?source, "Resolved network configuration");
        config.base_url = base_url.to_string();
        Ok(config)
    }

    fn lookup(
        &self,
        base_url: &str,
        explicit: Option<&NetworkConfig>,
    ) -> Option<(NetworkConfig, ConfigSource)> {
        if let Some(config) = explicit {
            return Some((config.clone(), ConfigSource::Explicit));
        }
        if let Some(config) = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(base_url)
        {
            return Some((config.clone(), ConfigSource::Endpoint));
        }
        self.global
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .map(|config| (config, ConfigSource::Global))
    }

    /// Returns where the configuration for `base_url` would come from.
    pub fn source_for(&self, base_url: &str, explicit: Option<&NetworkConfig>) -> Option<ConfigSource> {
        self.lookup(base_url, explicit).map(|(_, source)| source)
    }
}
