//! Core library for listcache.
//!
//! Two independent caching layers live here:
//! - [`cache`]: a namespaced key/value cache with TTL expiry, backed by a
//!   persistent file store or an in-memory fallback.
//! - [`offline`]: a versioned response cache that intercepts read requests and
//!   serves them with cache-first, network-first, or stale-while-revalidate.
//!
//! The two layers share no state. [`listings`] is the data-access consumer of
//! the local cache.

pub mod cache;
pub mod clock;
pub mod config;
pub mod listings;
pub mod offline;
pub mod utils;

pub use cache::{CacheManager, CacheStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use listings::{CachedListings, ListingFilters, ListingsClient, ListingsError};
pub use offline::{Interception, OfflineController};
