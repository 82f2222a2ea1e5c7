//! On-disk registry settings.
//!
//! A JSON document holding an optional global configuration and
//! per-endpoint configurations, loaded at start-up and applied to a
//! [`ClientRegistry`]:
//!
//! ```json
//! {
//!   "global": { "connect_timeout_ms": 10000, "converter_mode": "GSON" },
//!   "endpoints": {
//!     "https://api.example.com/": { "enable_cache": true, "cookie_mode": "PERSISTENT" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use portway_store::{StoreError, default_settings_path, load_json, load_json_or_default, save_json};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::ConfigError;
use crate::registry::ClientRegistry;

/// Registrations read from the settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Global fallback configuration.
    pub global: Option<NetworkConfig>,
    /// Per-endpoint configurations keyed by base URL.
    pub endpoints: BTreeMap<String, NetworkConfig>,
}

impl RegistrySettings {
    /// Returns the default settings file path.
    pub fn default_path() -> PathBuf {
        default_settings_path()
    }

    /// Loads settings from `path`.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        load_json(path).await
    }

    /// Loads settings from `path`, or empty settings if it is missing or
    /// unreadable.
    pub async fn load_or_default(path: &Path) -> Self {
        load_json_or_default(path).await
    }

    /// Saves settings to `path`.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        save_json(path, self).await
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.endpoints.is_empty()
    }

    /// Registers every configuration with `registry`.
    ///
    /// Stops at the first invalid endpoint URL.
    pub fn apply(&self, registry: &ClientRegistry) -> Result<(), ConfigError> {
        if let Some(global) = &self.global {
            registry.register_global(global.clone());
        }
        for (base_url, config) in &self.endpoints {
            registry.register_endpoint(base_url, config.clone())?;
        }
        debug!(
            global = self.global.is_some(),
            endpoints = self.endpoints.len(),
            "Applied registry settings"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CookieMode;
    use crate::probe::StaticProbe;
    use crate::resolver::ConfigSource;
    use std::sync::Arc;

    const DOC: &str = r#"{
        "global": { "connect_timeout_ms": 10000 },
        "endpoints": {
            "https://api.example.com": { "enable_cache": true, "cookie_mode": "PERSISTENT" }
        }
    }"#;

    #[tokio::test]
    async fn test_load_and_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        tokio::fs::write(&path, DOC).await.unwrap();

        let settings = RegistrySettings::load(&path).await.unwrap();
        let registry = ClientRegistry::builder()
            .probe(Arc::new(StaticProbe::online()))
            .build();
        settings.apply(&registry).unwrap();

        let resolver = registry.resolver();
        assert!(resolver.has_global());
        assert_eq!(
            resolver.source_for("https://api.example.com/", None),
            Some(ConfigSource::Endpoint)
        );
        let endpoint = resolver.resolve("https://api.example.com/", None).unwrap();
        assert!(endpoint.enable_cache);
        assert_eq!(endpoint.cookie_mode, Some(CookieMode::Persistent));
        assert_eq!(
            resolver.resolve("https://other.example.com/", None).unwrap().connect_timeout_ms,
            10_000
        );
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("network.json");
        let mut settings = RegistrySettings::default();
        settings.global = Some(NetworkConfig::new("").with_header("X-App", "demo"));

        settings.save(&path).await.unwrap();
        let loaded = RegistrySettings::load(&path).await.unwrap();

        let global = loaded.global.unwrap();
        assert_eq!(global.headers.get("X-App").map(String::as_str), Some("demo"));
        assert!(loaded.endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RegistrySettings::load_or_default(&dir.path().join("absent.json")).await;
        assert!(settings.is_empty());
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let mut settings = RegistrySettings::default();
        settings
            .endpoints
            .insert("not a url".to_string(), NetworkConfig::default());
        let registry = ClientRegistry::new();
        assert!(matches!(
            settings.apply(&registry),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }
}
