//! Key/value storage backends for the local cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use super::StorageError;

/// Key written and removed to check that a store accepts writes.
const STORAGE_TEST_KEY: &str = "__storage_test__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Persistent,
    Memory,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Persistent => "persistent",
            StorageKind::Memory => "memory",
        }
    }
}

/// String key/value store shared by one or more cache namespaces.
pub trait KeyValueStore: Send + Sync {
    fn kind(&self) -> StorageKind;
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Size accounting matches what a browser origin store charges: key plus value.
fn used_bytes(items: &HashMap<String, String>) -> usize {
    items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

fn check_quota(
    items: &HashMap<String, String>,
    key: &str,
    value: &str,
    quota: Option<usize>,
) -> Result<(), StorageError> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let replaced = items.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
    let needed = used_bytes(items) - replaced + key.len() + value.len();
    if needed > quota {
        return Err(StorageError::QuotaExceeded { needed, quota });
    }
    Ok(())
}

fn lock_items(items: &Mutex<HashMap<String, String>>) -> MutexGuard<'_, HashMap<String, String>> {
    items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Memory Store
// ============================================================================

/// Map-backed store. Lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock_items(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = lock_items(&self.items);
        check_quota(&items, key, value, self.quota)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        lock_items(&self.items).remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock_items(&self.items).keys().cloned().collect())
    }
}

// ============================================================================
// File Store
// ============================================================================

/// Persistent store: one JSON object file holding every key, rewritten on
/// each mutation. The in-memory copy only changes after the file write lands.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>, quota: Option<usize>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let items = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<HashMap<String, String>>(&contents) {
                Ok(items) => items,
                Err(e) => {
                    // Unreadable store is reset rather than disabling persistence for good
                    warn!(path = %path.display(), error = %e, "Discarding malformed storage file");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        debug!(path = %path.display(), items = items.len(), "Opened file store");

        Ok(Self {
            path,
            items: Mutex::new(items),
            quota,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &HashMap<String, String>) -> Result<(), StorageError> {
        let contents = serde_json::to_string(items)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn kind(&self) -> StorageKind {
        StorageKind::Persistent
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock_items(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = lock_items(&self.items);
        check_quota(&items, key, value, self.quota)?;

        let previous = items.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&items) {
            match previous {
                Some(old) => items.insert(key.to_string(), old),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = lock_items(&self.items);
        let Some(previous) = items.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&items) {
            items.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock_items(&self.items).keys().cloned().collect())
    }
}

// ============================================================================
// Backend Selection
// ============================================================================

/// Check that a store accepts a write and a remove.
fn probe(store: &dyn KeyValueStore) -> Result<(), StorageError> {
    store.set_item(STORAGE_TEST_KEY, STORAGE_TEST_KEY)?;
    store.remove_item(STORAGE_TEST_KEY)
}

/// Open the persistent store at `path`, falling back to memory if it cannot
/// be opened or written. `None` selects memory directly.
pub fn open_storage(path: Option<&Path>, quota: Option<usize>) -> Arc<dyn KeyValueStore> {
    let Some(path) = path else {
        debug!("No storage path configured, using memory store");
        return Arc::new(memory_with_quota(quota));
    };

    let opened = FileStore::open(path, quota).and_then(|store| {
        probe(&store)?;
        Ok(store)
    });

    match opened {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Persistent storage not available, using memory cache");
            Arc::new(memory_with_quota(quota))
        }
    }
}

fn memory_with_quota(quota: Option<usize>) -> MemoryStore {
    match quota {
        Some(quota) => MemoryStore::with_quota(quota),
        None => MemoryStore::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
