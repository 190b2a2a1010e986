use reqwest::Method;
use url::Url;

use super::{Destination, Request};
use crate::config::OfflineConfig;

/// Coarse kind of a read request, decided from its URL and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    StaticAsset,
    Navigation,
    Image,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted: goes straight to the network, never cached.
    PassThrough,
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::PassThrough => "pass-through",
            Route::CacheFirst => "cache-first",
            Route::NetworkFirst => "network-first",
            Route::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    static_extensions: Vec<String>,
    backend_host_marker: String,
    storage_path_marker: String,
}

impl Router {
    pub fn new(
        static_extensions: Vec<String>,
        backend_host_marker: impl Into<String>,
        storage_path_marker: impl Into<String>,
    ) -> Self {
        Self {
            static_extensions,
            backend_host_marker: backend_host_marker.into(),
            storage_path_marker: storage_path_marker.into(),
        }
    }

    pub fn from_config(config: &OfflineConfig) -> Self {
        Self::new(
            config.static_extensions.clone(),
            config.backend_host_marker.clone(),
            config.storage_path_marker.clone(),
        )
    }

    pub fn is_static_asset(&self, url: &Url) -> bool {
        let file = url.path().rsplit('/').next().unwrap_or_default();
        match file.rsplit_once('.') {
            Some((_, ext)) => self.static_extensions.iter().any(|e| e == ext),
            None => false,
        }
    }

    fn is_backend(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| host.contains(&self.backend_host_marker))
            .unwrap_or(false)
    }

    /// File-storage paths on the hosted backend; safe to cache.
    pub fn is_backend_storage(&self, url: &Url) -> bool {
        self.is_backend(url) && url.path().contains(&self.storage_path_marker)
    }

    /// Everything else on the hosted backend (auth, REST). Never cached, so a
    /// stale token can never be served.
    pub fn is_auth_sensitive(&self, url: &Url) -> bool {
        self.is_backend(url) && !url.path().contains(&self.storage_path_marker)
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        if self.is_static_asset(&request.url) {
            RequestClass::StaticAsset
        } else if request.accepts_html() {
            RequestClass::Navigation
        } else if request.destination == Destination::Image || self.is_backend_storage(&request.url) {
            RequestClass::Image
        } else {
            RequestClass::Other
        }
    }

    pub fn route(&self, request: &Request) -> Route {
        if request.method != Method::GET || self.is_auth_sensitive(&request.url) {
            return Route::PassThrough;
        }

        match self.classify(request) {
            RequestClass::StaticAsset => Route::CacheFirst,
            RequestClass::Navigation | RequestClass::Other => Route::NetworkFirst,
            RequestClass::Image => Route::StaleWhileRevalidate,
        }
    }
}
