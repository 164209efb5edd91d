//! Application configuration
//!
//! All deployment-specific values (cache version, install manifest, backend
//! URL) are injected through this module rather than hand-edited constants.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{StockLinkError, StockLinkResult};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the Stock-Link backend
    pub backend_base_url: String,

    /// User data directory (databases, session vault)
    pub data_dir: PathBuf,

    /// Offline cache settings
    pub cache: CacheConfig,

    /// Checkout settings
    pub checkout: CheckoutConfig,

    /// Deployment version polling
    pub update_poll: UpdatePollConfig,
}

/// Offline cache/update worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Application name, used as the cache name prefix
    pub app_name: String,

    /// Deployment version string, bumped per release
    pub version: String,

    /// Asset URLs pre-loaded into the cache at install time
    pub install_manifest: Vec<String>,

    /// Offline fallback page served to navigations when the network is down
    pub offline_fallback: String,

    /// Fetch interception policy
    pub fetch_policy: FetchPolicy,
}

/// How intercepted requests are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Serve from cache when present, fill the cache from the network on miss
    #[default]
    CacheFirst,
    /// Always try the network, fall back to cached content when it fails
    NetworkFirst,
}

/// Checkout flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Geolocation acquisition timeout in seconds
    pub location_timeout_secs: u64,

    /// Minimum digits for a mobile-money phone number
    pub min_msisdn_digits: usize,
}

/// Version-check polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePollConfig {
    /// Enable the background version poll
    pub enabled: bool,

    /// Poll interval in seconds
    pub interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> StockLinkResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| StockLinkError::config(format!("invalid config {}: {}", path.display(), e)))
    }
}

impl CacheConfig {
    /// Name of the cache store for this deployment.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.app_name, self.version)
    }
}

impl CheckoutConfig {
    pub fn location_timeout(&self) -> Duration {
        Duration::from_secs(self.location_timeout_secs)
    }
}

impl UpdatePollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:5001".to_string(),
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("stock-link"),
            cache: CacheConfig::default(),
            checkout: CheckoutConfig::default(),
            update_poll: UpdatePollConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            app_name: "stock-link".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            install_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/offline.html".to_string(),
                "/static/js/bundle.js".to_string(),
                "/static/css/main.css".to_string(),
                "/icons/icon-192.png".to_string(),
                "/icons/icon-512.png".to_string(),
            ],
            offline_fallback: "/offline.html".to_string(),
            fetch_policy: FetchPolicy::CacheFirst,
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            location_timeout_secs: 10,
            min_msisdn_digits: 9,
        }
    }
}

impl Default for UpdatePollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300, // 5 minutes
        }
    }
}

// Helper to get directories
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var_os("APPDATA").map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            home_dir().map(|h| h.join("Library").join("Application Support"))
        } else {
            std::env::var_os("XDG_DATA_HOME")
                .map(PathBuf::from)
                .or_else(|| home_dir().map(|h| h.join(".local").join("share")))
        }
    }

    fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_name_embeds_version() {
        let cache = CacheConfig {
            app_name: "stock-link".into(),
            version: "v5".into(),
            ..Default::default()
        };
        assert_eq!(cache.cache_name(), "stock-link-v5");
    }

    #[test]
    fn test_default_manifest_has_shell_assets() {
        let cache = CacheConfig::default();
        assert!(cache.install_manifest.contains(&"/index.html".to_string()));
        assert!(cache.install_manifest.contains(&"/offline.html".to_string()));
        assert!(cache
            .install_manifest
            .contains(&cache.offline_fallback.clone()));
    }

    #[test]
    fn test_fetch_policy_roundtrip() {
        let json = serde_json::to_string(&FetchPolicy::NetworkFirst).unwrap();
        assert_eq!(json, "\"network-first\"");
        let back: FetchPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FetchPolicy::NetworkFirst);
    }
}
