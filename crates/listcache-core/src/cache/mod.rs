//! Local caching module for short-lived application data.
//!
//! This module provides the `CacheManager`, a namespaced key/value cache with
//! per-entry TTL. Entries are stored as JSON envelopes
//! `{"value": .., "timestamp": .., "ttl": ..}` in a `KeyValueStore`:
//! - `FileStore`: persistent, a single JSON file per origin
//! - `MemoryStore`: used when the persistent store cannot be opened
//!
//! Expired entries are evicted lazily on read. There is no capacity-based
//! eviction; the store's quota is the only bound.

pub mod entry;
pub mod error;
pub mod manager;
pub mod store;

pub use entry::CacheEntry;
pub use error::StorageError;
pub use manager::{CacheManager, CacheStats};
pub use store::{open_storage, FileStore, KeyValueStore, MemoryStore, StorageKind};
