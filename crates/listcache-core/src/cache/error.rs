use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Quota exceeded: {needed} bytes needed, limit is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
