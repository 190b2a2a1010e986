//! The three caching strategies, applied against one bucket.
//!
//! None of them retry: a failed fetch goes straight to the fallback path.

use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::{CacheStorage, Fetcher, Request, Response};

/// Storage, network, and the bucket name the strategies write to.
/// Clone is cheap; the revalidation task takes its own copy.
#[derive(Clone)]
pub(crate) struct BucketHandle {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    bucket: Arc<str>,
    /// In-flight revalidations. Dropping the last handle aborts them, so
    /// callers that are about to exit should `drain` first.
    revalidations: Arc<Mutex<JoinSet<()>>>,
}

impl BucketHandle {
    pub(crate) fn new(storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>, bucket: &str) -> Self {
        Self {
            storage,
            fetcher,
            bucket: Arc::from(bucket),
            revalidations: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub(crate) fn bucket(&self) -> &str {
        &self.bucket
    }

    pub(crate) fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub(crate) fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    pub(crate) async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.storage.match_request(&self.bucket, request).await {
            Ok(hit) => hit,
            Err(e) => {
                error!(bucket = %self.bucket, url = %request.url, error = %e, "Bucket lookup failed");
                None
            }
        }
    }

    /// Keep a copy of a successful network response.
    async fn store(&self, request: &Request, response: &Response) {
        if !response.is_success() {
            debug!(url = %request.url, status = %response.status, "Not caching unsuccessful response");
            return;
        }
        if let Err(e) = self.storage.put(&self.bucket, request, response).await {
            warn!(bucket = %self.bucket, url = %request.url, error = %e, "Failed to store response");
        }
    }

    pub(crate) async fn cache_first(&self, request: &Request) -> Response {
        if let Some(cached) = self.lookup(request).await {
            debug!(url = %request.url, "Cache hit");
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(request, &response).await;
                response
            }
            Err(e) => {
                error!(url = %request.url, error = %e, "Cache first failed");
                Response::offline()
            }
        }
    }

    pub(crate) async fn network_first(&self, request: &Request, offline_page: Option<&Request>) -> Response {
        let error = match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(request, &response).await;
                return response;
            }
            Err(e) => e,
        };

        warn!(url = %request.url, error = %error, "Network unavailable, falling back to cache");

        if let Some(cached) = self.lookup(request).await {
            return cached;
        }

        if request.accepts_html() {
            if let Some(page) = offline_page {
                if let Some(fallback) = self.lookup(page).await {
                    debug!(url = %request.url, "Serving offline page");
                    return fallback;
                }
            }
        }

        Response::offline()
    }

    pub(crate) async fn stale_while_revalidate(&self, request: &Request) -> Response {
        if let Some(cached) = self.lookup(request).await {
            self.spawn_revalidation(request.clone());
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store(request, &response).await;
                response
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "No cached copy and network failed");
                Response::offline()
            }
        }
    }

    /// Refresh the stored copy in the background. Failures are only logged.
    fn spawn_revalidation(&self, request: Request) {
        let handle = self.clone();
        let mut tasks = self
            .revalidations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Reap finished tasks so the set only holds in-flight work
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            match handle.fetcher.fetch(&request).await {
                Ok(response) => {
                    handle.store(&request, &response).await;
                    debug!(url = %request.url, "Revalidated cached response");
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Background revalidation failed");
                }
            }
        });
    }

    /// Wait for every background revalidation, including any started while
    /// waiting.
    pub(crate) async fn drain(&self) {
        loop {
            let mut tasks = {
                let mut guard = self
                    .revalidations
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *guard)
            };
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(bucket = %self.bucket, error = %e, "Revalidation task failed");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use reqwest::StatusCode;
    use url::Url;

    use super::*;
    use crate::offline::testing::ScriptedFetcher;
    use crate::offline::MemoryCacheStorage;

    const BUCKET: &str = "debrasi-cache-v5.0.0";

    fn setup() -> (BucketHandle, Arc<MemoryCacheStorage>, Arc<ScriptedFetcher>) {
        let storage = Arc::new(MemoryCacheStorage::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        let handle = BucketHandle::new(storage.clone(), fetcher.clone(), BUCKET);
        (handle, storage, fetcher)
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    async fn seed(storage: &MemoryCacheStorage, request: &Request, body: &'static str) {
        storage
            .put(BUCKET, request, &Response::new(StatusCode::OK, body))
            .await
            .unwrap();
    }

    async fn stored_body(storage: &MemoryCacheStorage, request: &Request) -> Option<Bytes> {
        storage
            .match_request(BUCKET, request)
            .await
            .unwrap()
            .map(|r| r.body)
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let (handle, storage, fetcher) = setup();
        let request = Request::get(url("https://debrasi.com/css/styles.css"));
        seed(&storage, &request, "cached css").await;
        fetcher.serve("https://debrasi.com/css/styles.css", "fresh css");

        let response = handle.cache_first(&request).await;
        assert_eq!(response.body, Bytes::from_static(b"cached css"));
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_stores() {
        let (handle, storage, fetcher) = setup();
        let request = Request::get(url("https://debrasi.com/js/main.js"));
        fetcher.serve("https://debrasi.com/js/main.js", "console.log(1)");

        let response = handle.cache_first(&request).await;
        assert_eq!(response.body, Bytes::from_static(b"console.log(1)"));
        assert_eq!(stored_body(&storage, &request).await, Some(Bytes::from_static(b"console.log(1)")));
    }

    #[tokio::test]
    async fn test_cache_first_offline_without_entry() {
        let (handle, _, fetcher) = setup();
        fetcher.set_offline(true);
        let response = handle.cache_first(&Request::get(url("https://debrasi.com/js/x.js"))).await;
        assert!(response.is_offline_fallback());
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_unsuccessful_responses_are_not_stored() {
        let (handle, storage, _) = setup();
        let request = Request::get(url("https://debrasi.com/js/gone.js"));
        let response = handle.cache_first(&request).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(stored_body(&storage, &request).await.is_none());
    }

    #[tokio::test]
    async fn test_network_first_prefers_fresh_response() {
        let (handle, storage, fetcher) = setup();
        let request = Request::navigate(url("https://debrasi.com/properties.html"));
        seed(&storage, &request, "old page").await;
        fetcher.serve("https://debrasi.com/properties.html", "new page");

        let response = handle.network_first(&request, None).await;
        assert_eq!(response.body, Bytes::from_static(b"new page"));
        assert_eq!(stored_body(&storage, &request).await, Some(Bytes::from_static(b"new page")));
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache() {
        let (handle, storage, fetcher) = setup();
        let request = Request::navigate(url("https://debrasi.com/properties.html"));
        seed(&storage, &request, "old page").await;
        fetcher.set_offline(true);

        let response = handle.network_first(&request, None).await;
        assert_eq!(response.body, Bytes::from_static(b"old page"));
    }

    #[tokio::test]
    async fn test_network_first_serves_offline_page_for_navigation() {
        let (handle, storage, fetcher) = setup();
        let offline_page = Request::navigate(url("https://debrasi.com/offline.html"));
        seed(&storage, &offline_page, "you are offline").await;
        fetcher.set_offline(true);

        let page = Request::navigate(url("https://debrasi.com/dashboard.html"));
        let response = handle.network_first(&page, Some(&offline_page)).await;
        assert_eq!(response.body, Bytes::from_static(b"you are offline"));

        // Non-HTML requests never get the offline page
        let api = Request::get(url("https://debrasi.com/data.json"));
        let response = handle.network_first(&api, Some(&offline_page)).await;
        assert!(response.is_offline_fallback());
    }

    #[tokio::test]
    async fn test_network_first_without_offline_page_is_synthetic() {
        let (handle, _, fetcher) = setup();
        fetcher.set_offline(true);
        let page = Request::navigate(url("https://debrasi.com/"));
        let offline_page = Request::navigate(url("https://debrasi.com/offline.html"));
        let response = handle.network_first(&page, Some(&offline_page)).await;
        assert!(response.is_offline_fallback());
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_returns_cached_then_updates() {
        let (handle, storage, fetcher) = setup();
        let request = Request::image(url("https://debrasi.com/images/house.jpg"));
        seed(&storage, &request, "old image").await;
        fetcher.serve("https://debrasi.com/images/house.jpg", "new image");
        fetcher.hold();

        // Network is held, so this only completes if it does not wait for it
        let response = tokio::time::timeout(Duration::from_secs(1), handle.stale_while_revalidate(&request))
            .await
            .expect("stale response must not wait on the network");
        assert_eq!(response.body, Bytes::from_static(b"old image"));

        fetcher.release();
        let updated = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if stored_body(&storage, &request).await == Some(Bytes::from_static(b"new image")) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(updated.is_ok(), "background revalidation should update the bucket");

        let next = handle.stale_while_revalidate(&request).await;
        assert_eq!(next.body, Bytes::from_static(b"new image"));
    }

    #[tokio::test]
    async fn test_drain_waits_for_revalidation() {
        let (handle, storage, fetcher) = setup();
        let request = Request::image(url("https://debrasi.com/images/house.jpg"));
        seed(&storage, &request, "old image").await;
        fetcher.serve("https://debrasi.com/images/house.jpg", "new image");

        let response = handle.stale_while_revalidate(&request).await;
        assert_eq!(response.body, Bytes::from_static(b"old image"));

        handle.drain().await;
        assert_eq!(fetcher.calls(), vec!["https://debrasi.com/images/house.jpg"]);
        assert_eq!(stored_body(&storage, &request).await, Some(Bytes::from_static(b"new image")));

        // Nothing left to wait for
        tokio::time::timeout(Duration::from_secs(1), handle.drain())
            .await
            .expect("drain with no pending work returns at once");
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_swallows_background_failure() {
        let (handle, storage, fetcher) = setup();
        let request = Request::image(url("https://debrasi.com/images/house.jpg"));
        seed(&storage, &request, "old image").await;
        fetcher.set_offline(true);

        let response = handle.stale_while_revalidate(&request).await;
        assert_eq!(response.body, Bytes::from_static(b"old image"));

        handle.drain().await;
        assert_eq!(stored_body(&storage, &request).await, Some(Bytes::from_static(b"old image")));
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_miss_awaits_network() {
        let (handle, storage, fetcher) = setup();
        let request = Request::image(url("https://debrasi.com/images/new.jpg"));
        fetcher.serve("https://debrasi.com/images/new.jpg", "first load");

        let response = handle.stale_while_revalidate(&request).await;
        assert_eq!(response.body, Bytes::from_static(b"first load"));
        assert!(stored_body(&storage, &request).await.is_some());

        fetcher.set_offline(true);
        let missing = Request::image(url("https://debrasi.com/images/none.jpg"));
        assert!(handle.stale_while_revalidate(&missing).await.is_offline_fallback());
    }
}
