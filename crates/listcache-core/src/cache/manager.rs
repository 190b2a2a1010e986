use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use super::{CacheEntry, KeyValueStore, StorageKind};
use crate::clock::{Clock, SystemClock};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "debrasi_cache";

/// Lifetime applied when callers have no better idea.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub namespace: String,
    pub item_count: usize,
    /// Approximate: length of the stored envelopes.
    pub total_size_bytes: usize,
}

/// Namespaced TTL cache over a shared key/value store.
///
/// Several managers with different namespaces can share one store; each only
/// ever sees and clears keys under its own `namespace:` prefix. Every
/// operation degrades to a safe default (absent, `false`) and logs instead
/// of failing.
pub struct CacheManager {
    namespace: String,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    pub fn new(namespace: impl Into<String>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            namespace: namespace.into(),
            storage,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source, mostly for tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }

    fn namespace_keys(&self) -> Result<Vec<String>, super::StorageError> {
        let prefix = self.prefix();
        Ok(self
            .storage
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(&prefix))
            .collect())
    }

    /// Store `value` under `key` for `ttl`. Returns false if the value could
    /// not be encoded or the store refused the write (e.g. quota).
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                error!(key = key, error = %e, "Failed to encode cache value");
                return false;
            }
        };

        let entry = CacheEntry::new(value, self.clock.now_millis(), ttl);
        let encoded = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                error!(key = key, error = %e, "Failed to encode cache entry");
                return false;
            }
        };

        match self.storage.set_item(&self.cache_key(key), &encoded) {
            Ok(()) => true,
            Err(e) => {
                error!(key = key, error = %e, "Error setting cache");
                false
            }
        }
    }

    fn load_entry(&self, key: &str) -> Option<CacheEntry> {
        let raw = match self.storage.get_item(&self.cache_key(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!(key = key, error = %e, "Error reading cache");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!(key = key, error = %e, "Malformed cache entry");
                None
            }
        }
    }

    /// Fetch a live value. Expired entries are evicted and reported absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.load_entry(key)?;

        if entry.is_expired(self.clock.now_millis()) {
            debug!(key = key, ttl_ms = entry.ttl, "Cache entry expired");
            self.remove(key);
            return None;
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(key = key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.get::<Value>(key).is_some()
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.storage.remove_item(&self.cache_key(key)) {
            Ok(()) => true,
            Err(e) => {
                error!(key = key, error = %e, "Error removing cache");
                false
            }
        }
    }

    /// Remove every entry in this namespace, leaving other namespaces alone.
    pub fn clear(&self) -> bool {
        let keys = match self.namespace_keys() {
            Ok(keys) => keys,
            Err(e) => {
                error!(namespace = %self.namespace, error = %e, "Error listing cache keys");
                return false;
            }
        };

        let mut ok = true;
        for key in keys {
            if let Err(e) = self.storage.remove_item(&key) {
                error!(key = %key, error = %e, "Error clearing cache");
                ok = false;
            }
        }
        debug!(namespace = %self.namespace, "Cache cleared");
        ok
    }

    /// Return the cached value, or run `producer`, cache its output, and
    /// return it. A producer error is returned as-is and nothing is cached.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, producer: F, ttl: Duration) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key) {
            debug!(key = key, "Loaded from cache");
            return Ok(cached);
        }

        match producer().await {
            Ok(value) => {
                self.set(key, &value, ttl);
                Ok(value)
            }
            Err(e) => {
                error!(key = key, error = %e, "Error in get_or_set");
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            namespace: self.namespace.clone(),
            item_count: 0,
            total_size_bytes: 0,
        };

        match self.namespace_keys() {
            Ok(keys) => {
                stats.item_count = keys.len();
                stats.total_size_bytes = keys
                    .iter()
                    .filter_map(|k| self.storage.get_item(k).ok().flatten())
                    .map(|v| v.len())
                    .sum();
            }
            Err(e) => {
                error!(namespace = %self.namespace, error = %e, "Error getting cache stats");
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================
