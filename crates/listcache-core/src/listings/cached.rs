use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use super::{ListingFilters, ListingsClient, ListingsError};
use crate::cache::CacheManager;

/// Listings change rarely; five minutes keeps browsing snappy without
/// hiding edits for long.
pub const LISTINGS_TTL: Duration = Duration::from_secs(5 * 60);

const ALL_LISTINGS_KEY: &str = "all_properties";

/// `ListingsClient` behind the local cache.
pub struct CachedListings {
    client: ListingsClient,
    cache: Arc<CacheManager>,
    ttl: Duration,
}

impl CachedListings {
    pub fn new(client: ListingsClient, cache: Arc<CacheManager>) -> Self {
        Self {
            client,
            cache,
            ttl: LISTINGS_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn all(&self) -> Result<Vec<Value>, ListingsError> {
        self.cache
            .get_or_set(ALL_LISTINGS_KEY, || self.client.fetch_all(), self.ttl)
            .await
    }

    pub async fn search(&self, filters: &ListingFilters) -> Result<Vec<Value>, ListingsError> {
        self.cache
            .get_or_set(&filters.cache_key(), || self.client.search(filters), self.ttl)
            .await
    }

    pub async fn by_id(&self, id: &str) -> Result<Value, ListingsError> {
        self.cache
            .get_or_set(&format!("property_{}", id), || self.client.fetch_by_id(id), self.ttl)
            .await
    }

    /// Drop every cached listing read, e.g. after an edit in the dashboard.
    pub fn clear_cache(&self) -> bool {
        let cleared = self.cache.clear();
        info!(namespace = self.cache.namespace(), "Listings cache cleared");
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyValueStore, MemoryStore};
    use serde_json::json;

    /// Nothing listens on the discard port, so any network use fails fast.
    const UNREACHABLE_BACKEND: &str = "http://127.0.0.1:9";

    fn listings() -> (CachedListings, Arc<CacheManager>) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cache = Arc::new(CacheManager::new("listings", store));
        let client = ListingsClient::new(UNREACHABLE_BACKEND, "key").unwrap();
        (CachedListings::new(client, cache.clone()), cache)
    }

    #[tokio::test]
    async fn test_all_served_from_cache() {
        let (listings, cache) = listings();
        let rows = vec![json!({"id": 1, "title": "Depto en Belgrano"})];
        assert!(cache.set(ALL_LISTINGS_KEY, &rows, LISTINGS_TTL));

        assert_eq!(listings.all().await.unwrap(), rows);
    }

    #[tokio::test]
    async fn test_by_id_and_search_use_their_own_keys() {
        let (listings, cache) = listings();
        let house = json!({"id": "7", "title": "Casa"});
        cache.set("property_7", &house, LISTINGS_TTL);

        let filters = ListingFilters {
            operation: Some("alquiler".to_string()),
            ..Default::default()
        };
        cache.set(&filters.cache_key(), &vec![house.clone()], LISTINGS_TTL);

        assert_eq!(listings.by_id("7").await.unwrap(), house);
        assert_eq!(listings.search(&filters).await.unwrap(), vec![house]);
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_cached() {
        let (listings, cache) = listings();
        let result = listings.all().await;
        assert!(matches!(result, Err(ListingsError::NetworkError(_))));
        assert!(!cache.has(ALL_LISTINGS_KEY));
    }

    #[tokio::test]
    async fn test_clear_cache_forgets_reads() {
        let (listings, cache) = listings();
        cache.set(ALL_LISTINGS_KEY, &Vec::<Value>::new(), LISTINGS_TTL);
        assert!(listings.clear_cache());
        assert!(!cache.has(ALL_LISTINGS_KEY));
    }
}
