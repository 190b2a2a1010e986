use std::sync::{Arc, Mutex};

use futures::future::try_join_all;
use tracing::{debug, error, info, warn};
use url::Url;

use super::strategy::BucketHandle;
use super::{
    ActivateError, BucketError, CacheStorage, FetchError, Fetcher, InstallError, Request, Response,
    Route, Router,
};
use crate::config::OfflineConfig;

/// Where the controller is in its install/activate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Parsed,
    Installing,
    Installed,
    /// In control: requests are intercepted.
    Activated,
    /// Install failed; this version never takes control.
    Redundant,
}

/// Result of offering a request to the controller.
#[derive(Debug)]
pub enum Interception {
    /// Not handled; the caller talks to the network directly.
    PassThrough,
    Respond(Response),
}

/// Network-interception cache for one deployed version.
///
/// Owns nothing global: storage and network are injected, and the bucket
/// name is derived from the configured prefix and version tag.
pub struct OfflineController {
    config: OfflineConfig,
    origin: Url,
    router: Router,
    handle: BucketHandle,
    offline_page: Option<Request>,
    state: Mutex<Lifecycle>,
}

impl OfflineController {
    pub fn new(
        config: OfflineConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, url::ParseError> {
        let origin = config.origin_url()?;
        let offline_page = match &config.offline_page {
            Some(path) => Some(Request::navigate(origin.join(path)?)),
            None => None,
        };

        Ok(Self {
            router: Router::from_config(&config),
            handle: BucketHandle::new(storage, fetcher, &config.bucket_name()),
            origin,
            offline_page,
            config,
            state: Mutex::new(Lifecycle::Parsed),
        })
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn bucket_name(&self) -> &str {
        self.handle.bucket()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn state(&self) -> Lifecycle {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: Lifecycle) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
        debug!(bucket = self.bucket_name(), state = ?state, "Lifecycle transition");
    }

    fn manifest_requests(&self) -> Result<Vec<Request>, InstallError> {
        self.config
            .precache
            .iter()
            .map(|path| {
                self.origin
                    .join(path)
                    .map(Request::get)
                    .map_err(|source| InstallError::InvalidPath {
                        path: path.clone(),
                        source,
                    })
            })
            .collect()
    }

    /// Precache the manifest into the current bucket. Every asset is fetched
    /// before anything is written; one failure aborts the whole install.
    pub async fn install(&self) -> Result<usize, InstallError> {
        info!(bucket = self.bucket_name(), "Installing offline cache");
        self.set_state(Lifecycle::Installing);

        match self.precache().await {
            Ok(count) => {
                self.set_state(Lifecycle::Installed);
                info!(bucket = self.bucket_name(), assets = count, "Precached static assets");
                Ok(count)
            }
            Err(e) => {
                self.set_state(Lifecycle::Redundant);
                error!(bucket = self.bucket_name(), error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, InstallError> {
        let requests = self.manifest_requests()?;
        let fetcher = self.handle.fetcher();

        let fetched = try_join_all(requests.into_iter().map(|request| async move {
            let response = fetcher
                .fetch(&request)
                .await
                .map_err(|source| InstallError::Fetch {
                    url: request.url.to_string(),
                    source,
                })?;
            if !response.is_success() {
                return Err(InstallError::BadStatus {
                    url: request.url.to_string(),
                    status: response.status,
                });
            }
            Ok((request, response))
        }))
        .await?;

        for (request, response) in &fetched {
            self.handle
                .storage()
                .put(self.bucket_name(), request, response)
                .await?;
        }
        Ok(fetched.len())
    }

    /// Delete every bucket but the current one and take control.
    /// Returns the names of the deleted buckets.
    pub async fn activate(&self) -> Result<Vec<String>, ActivateError> {
        let state = self.state();
        if !matches!(state, Lifecycle::Installed | Lifecycle::Activated) {
            return Err(ActivateError::NotInstalled(state));
        }

        info!(bucket = self.bucket_name(), "Activating offline cache");
        let storage = self.handle.storage();
        let mut deleted = Vec::new();
        for name in storage.keys().await? {
            if name != self.bucket_name() {
                info!(bucket = %name, "Deleting old cache");
                storage.delete(&name).await?;
                deleted.push(name);
            }
        }

        self.set_state(Lifecycle::Activated);
        Ok(deleted)
    }

    /// Take control again after a restart when this version's bucket is
    /// already in place. Returns false if it has never been installed.
    pub async fn resume(&self) -> Result<bool, BucketError> {
        if self.handle.storage().has(self.bucket_name()).await? {
            self.set_state(Lifecycle::Activated);
            return Ok(true);
        }
        Ok(false)
    }

    /// Route one request. Before activation nothing is intercepted.
    pub async fn intercept(&self, request: &Request) -> Interception {
        if self.state() != Lifecycle::Activated {
            debug!(url = %request.url, "Not in control, passing through");
            return Interception::PassThrough;
        }

        let route = self.router.route(request);
        debug!(url = %request.url, route = route.as_str(), "Intercepted request");

        let response = match route {
            Route::PassThrough => return Interception::PassThrough,
            Route::CacheFirst => self.handle.cache_first(request).await,
            Route::NetworkFirst => {
                self.handle
                    .network_first(request, self.offline_page.as_ref())
                    .await
            }
            Route::StaleWhileRevalidate => self.handle.stale_while_revalidate(request).await,
        };
        Interception::Respond(response)
    }

    /// Wait for background revalidations to finish. Pending ones are aborted
    /// when the controller is dropped, so call this before exiting.
    pub async fn drain(&self) {
        self.handle.drain().await;
    }

    /// Intercept, going to the network directly for pass-through requests.
    pub async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        match self.intercept(request).await {
            Interception::Respond(response) => Ok(response),
            Interception::PassThrough => self.handle.fetcher().fetch(request).await.map_err(|e| {
                warn!(url = %request.url, error = %e, "Pass-through request failed");
                e
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
