//! Cached access to the hosted backend's property listings.
//!
//! `ListingsClient` talks to the backend's REST interface; `CachedListings`
//! puts a `CacheManager` in front of it so repeated reads within the TTL
//! (5 minutes by default) never leave the process.

pub mod cached;
pub mod client;
pub mod error;
pub mod filters;

pub use cached::{CachedListings, LISTINGS_TTL};
pub use client::ListingsClient;
pub use error::ListingsError;
pub use filters::ListingFilters;
