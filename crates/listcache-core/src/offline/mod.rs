//! Offline response cache for read requests.
//!
//! The `OfflineController` follows an install / activate / fetch lifecycle:
//! - install: precache a fixed manifest into the versioned bucket, all or nothing
//! - activate: delete every bucket that is not the current version
//! - fetch: classify each request and serve it with one of three strategies
//!
//! | Request                           | Strategy               |
//! |-----------------------------------|------------------------|
//! | non-GET, backend auth paths       | pass through           |
//! | static asset (by extension)       | cache first            |
//! | HTML navigation (by `Accept`)     | network first          |
//! | image, backend storage path       | stale while revalidate |
//! | anything else                     | network first          |
//!
//! Bumping the version tag is the only invalidation mechanism.

pub mod controller;
pub mod error;
pub mod http;
pub mod network;
pub mod route;
pub mod storage;
mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{Interception, Lifecycle, OfflineController};
pub use error::{ActivateError, BucketError, FetchError, InstallError};
pub use http::{Destination, Request, Response, OFFLINE_MARKER_HEADER};
pub use network::{Fetcher, HttpFetcher};
pub use route::{RequestClass, Route, Router};
pub use storage::{CacheStorage, DirCacheStorage, MemoryCacheStorage};
