use reqwest::StatusCode;
use thiserror::Error;

use super::Lifecycle;

/// A request that never produced an HTTP response. Any status code, even
/// 5xx, is a resolved response rather than a `FetchError`.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Unreachable(String),
}

#[derive(Error, Debug)]
pub enum BucketError {
    #[error("Invalid bucket name: {0}")]
    InvalidName(String),

    #[error("Bucket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt bucket entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Invalid precache path {path}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Precache of {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Precache of {url} returned status {status}")]
    BadStatus { url: String, status: StatusCode },

    #[error("Failed to store precached assets: {0}")]
    Storage(#[from] BucketError),
}

#[derive(Error, Debug)]
pub enum ActivateError {
    #[error("Cannot activate from state {0:?}")]
    NotInstalled(Lifecycle),

    #[error("Failed to remove old buckets: {0}")]
    Storage(#[from] BucketError),
}
