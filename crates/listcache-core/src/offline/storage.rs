//! Named buckets of request/response pairs.
//!
//! Entries are keyed by request identity (`Request::cache_key`), so writing
//! the same request twice simply replaces the earlier response.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use super::{BucketError, Request, Response};

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every bucket.
    async fn keys(&self) -> Result<Vec<String>, BucketError>;

    async fn has(&self, bucket: &str) -> Result<bool, BucketError>;

    /// Remove a bucket and everything in it. Returns whether it existed.
    async fn delete(&self, bucket: &str) -> Result<bool, BucketError>;

    async fn match_request(
        &self,
        bucket: &str,
        request: &Request,
    ) -> Result<Option<Response>, BucketError>;

    /// Store a response, creating the bucket if needed.
    async fn put(&self, bucket: &str, request: &Request, response: &Response)
        -> Result<(), BucketError>;
}

// ============================================================================
// Memory Storage
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<BTreeMap<String, HashMap<String, Response>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, BucketError> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn has(&self, bucket: &str) -> Result<bool, BucketError> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn delete(&self, bucket: &str) -> Result<bool, BucketError> {
        Ok(self.buckets.write().await.remove(bucket).is_some())
    }

    async fn match_request(
        &self,
        bucket: &str,
        request: &Request,
    ) -> Result<Option<Response>, BucketError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(bucket)
            .and_then(|entries| entries.get(&request.cache_key()))
            .cloned())
    }

    async fn put(
        &self,
        bucket: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), BucketError> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(request.cache_key(), response.clone());
        Ok(())
    }
}

// ============================================================================
// Directory Storage
// ============================================================================

/// On-disk metadata for one stored response. The body lives next to it in
/// the file named by `body`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredResponse {
    key: String,
    body: String,
    status: u16,
    headers: Vec<(String, String)>,
    url: Option<String>,
}

impl StoredResponse {
    fn from_response(key: String, body: String, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            key,
            body,
            status: response.status.as_u16(),
            headers,
            url: response.url.as_ref().map(|u| u.to_string()),
        }
    }

    fn into_response(self, body: Bytes) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %name, "Skipping unreadable stored header"),
            }
        }

        Response {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body,
            url: self.url.as_deref().and_then(|u| Url::parse(u).ok()),
        }
    }
}

/// One directory per bucket under `root`; each entry is a `<hash>.json`
/// metadata file pointing at a `<hash>.<token>.body` file.
///
/// A `put` never modifies files a reader can see. The body goes to a fresh
/// file, the metadata is renamed over the old one, and only then is the
/// previous body removed. An interrupted `put` leaves at most an orphan file
/// and the previous entry intact.
#[derive(Debug, Clone)]
pub struct DirCacheStorage {
    root: PathBuf,
}

impl DirCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, BucketError> {
        let valid = !bucket.is_empty()
            && !bucket.starts_with('.')
            && !bucket.contains(['/', '\\']);
        if !valid {
            return Err(BucketError::InvalidName(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    fn entry_stem(request: &Request) -> String {
        hex::encode(Sha256::digest(request.cache_key().as_bytes()))
    }

    async fn read_stored(&self, meta_path: &Path) -> Result<Option<StoredResponse>, BucketError> {
        match read_optional(meta_path).await? {
            Some(meta) => Ok(Some(serde_json::from_slice(&meta)?)),
            None => Ok(None),
        }
    }
}

/// Distinguishes concurrent writes to the same entry, within and across
/// processes.
fn write_token() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!(
        "{}-{:x}-{}",
        std::process::id(),
        nanos,
        SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Body file names come from our own metadata, but never follow one out of
/// the bucket directory.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, BucketError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheStorage for DirCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, BucketError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn has(&self, bucket: &str) -> Result<bool, BucketError> {
        let dir = self.bucket_dir(bucket)?;
        Ok(tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    async fn delete(&self, bucket: &str) -> Result<bool, BucketError> {
        let dir = self.bucket_dir(bucket)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(bucket = bucket, "Deleted bucket directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn match_request(
        &self,
        bucket: &str,
        request: &Request,
    ) -> Result<Option<Response>, BucketError> {
        let dir = self.bucket_dir(bucket)?;
        let stem = Self::entry_stem(request);

        let Some(stored) = self.read_stored(&dir.join(format!("{}.json", stem))).await? else {
            return Ok(None);
        };
        if stored.key != request.cache_key() {
            return Ok(None);
        }
        if !is_plain_file_name(&stored.body) {
            warn!(bucket = bucket, key = %stored.key, body = %stored.body, "Bucket entry has an invalid body path");
            return Ok(None);
        }

        let Some(body) = read_optional(&dir.join(&stored.body)).await? else {
            warn!(bucket = bucket, key = %stored.key, "Bucket entry is missing its body");
            return Ok(None);
        };

        Ok(Some(stored.into_response(Bytes::from(body))))
    }

    async fn put(
        &self,
        bucket: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), BucketError> {
        let dir = self.bucket_dir(bucket)?;
        tokio::fs::create_dir_all(&dir).await?;

        let stem = Self::entry_stem(request);
        let token = write_token();
        let body_name = format!("{}.{}.body", stem, token);
        let meta_path = dir.join(format!("{}.json", stem));
        let meta_tmp = dir.join(format!("{}.json.{}.tmp", stem, token));

        let previous = match self.read_stored(&meta_path).await {
            Ok(stored) => stored.map(|s| s.body),
            Err(e) => {
                debug!(bucket = bucket, error = %e, "Replacing unreadable bucket entry");
                None
            }
        };

        let stored = StoredResponse::from_response(request.cache_key(), body_name.clone(), response);
        let written = async {
            tokio::fs::write(dir.join(&body_name), &response.body).await?;
            tokio::fs::write(&meta_tmp, serde_json::to_vec(&stored)?).await?;
            tokio::fs::rename(&meta_tmp, &meta_path).await?;
            Ok::<(), BucketError>(())
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&meta_tmp).await;
            let _ = tokio::fs::remove_file(dir.join(&body_name)).await;
            return Err(e);
        }

        if let Some(old) = previous.filter(|old| *old != body_name && is_plain_file_name(old)) {
            if let Err(e) = tokio::fs::remove_file(dir.join(&old)).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(bucket = bucket, file = %old, error = %e, "Failed to remove replaced body");
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
