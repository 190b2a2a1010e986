use thiserror::Error;

use crate::utils::truncate_string;

#[derive(Error, Debug)]
pub enum ListingsError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - check the backend key")]
    Unauthorized,

    #[error("Listing not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid backend configuration: {0}")]
    InvalidConfig(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ListingsError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = truncate_string(body, MAX_ERROR_BODY_LENGTH);
        match status.as_u16() {
            401 => ListingsError::Unauthorized,
            403 => ListingsError::AccessDenied(truncated),
            404 => ListingsError::NotFound(truncated),
            429 => ListingsError::RateLimited,
            500..=599 => ListingsError::ServerError(truncated),
            _ => ListingsError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}
