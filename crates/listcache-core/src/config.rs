//! Application configuration management.
//!
//! Configuration is stored at `~/.config/listcache/config.json`; a missing
//! file means defaults. A few settings can be overridden from the
//! environment (a `.env` file is loaded by the binary):
//! - `LISTCACHE_CONFIG`: alternative config file path
//! - `LISTCACHE_BACKEND_URL`, `LISTCACHE_BACKEND_KEY`: hosted backend
//! - `LISTCACHE_ORIGIN`: site origin the precache manifest is resolved against

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::manager::DEFAULT_NAMESPACE;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "listcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// File holding the persistent local cache
const STORAGE_FILE: &str = "storage.json";

/// Directory holding offline buckets
const BUCKETS_DIR: &str = "offline";

/// Roughly what browsers grant an origin for local storage.
const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalCacheConfig {
    pub namespace: String,
    /// Defaults to `storage.json` in the cache directory.
    pub storage_file: Option<PathBuf>,
    pub quota_bytes: Option<usize>,
    pub listings_ttl_secs: u64,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            storage_file: None,
            quota_bytes: Some(DEFAULT_QUOTA_BYTES),
            listings_ttl_secs: 5 * 60,
        }
    }
}

impl LocalCacheConfig {
    pub fn listings_ttl(&self) -> Duration {
        Duration::from_secs(self.listings_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OfflineConfig {
    pub cache_prefix: String,
    /// Bumped on every deploy; the only way to invalidate the offline cache.
    pub version: String,
    pub origin: String,
    /// Root-relative paths fetched at install time.
    pub precache: Vec<String>,
    pub offline_page: Option<String>,
    pub static_extensions: Vec<String>,
    /// Substring identifying the hosted backend's host.
    pub backend_host_marker: String,
    /// Substring identifying the backend's file-storage paths.
    pub storage_path_marker: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        let precache = [
            "/",
            "/index.html",
            "/properties.html",
            "/dashboard.html",
            "/offline.html",
            "/css/styles.css",
            "/js/main.js",
            "/js/propertyService.js",
            "/js/utils/cache.js",
            "/js/utils/errorHandler.js",
            "/js/utils/validators.js",
            "/js/utils/imageOptimizer.js",
            "/js/utils/performance.js",
            "/js/dashboard.js",
            "/js/supabaseClient.js",
            "/images/debrasi-isologo-ok.png",
            "/manifest.json",
        ];

        Self {
            cache_prefix: "debrasi-cache".to_string(),
            version: "v5.0.0".to_string(),
            origin: "http://localhost:8080/".to_string(),
            precache: precache.iter().map(|p| p.to_string()).collect(),
            offline_page: Some("/offline.html".to_string()),
            static_extensions: ["css", "js", "woff", "woff2", "ttf", "otf"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            backend_host_marker: "supabase".to_string(),
            storage_path_marker: "storage".to_string(),
        }
    }
}

impl OfflineConfig {
    pub fn bucket_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    pub fn origin_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.origin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub local: LocalCacheConfig,
    pub offline: OfflineConfig,
    pub backend: BackendConfig,
}

impl Config {
    /// Load from `LISTCACHE_CONFIG` or the default path, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = match std::env::var("LISTCACHE_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => Self::config_path()?,
        };
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("LISTCACHE_BACKEND_URL") {
            self.backend.url = Some(url);
        }
        if let Some(key) = lookup("LISTCACHE_BACKEND_KEY") {
            self.backend.anon_key = Some(key);
        }
        if let Some(origin) = lookup("LISTCACHE_ORIGIN") {
            self.offline.origin = origin;
        }
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.local.storage_file {
            Some(path) => Ok(path.clone()),
            None => Ok(self.cache_dir()?.join(STORAGE_FILE)),
        }
    }

    pub fn buckets_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(BUCKETS_DIR))
    }
}
