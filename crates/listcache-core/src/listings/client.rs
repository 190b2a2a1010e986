//! REST client for the hosted backend's `properties` table.

use std::time::Duration;

use reqwest::{header, Client};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{ListingFilters, ListingsError};

/// Path of the listings table under the backend's REST root.
const PROPERTIES_PATH: &str = "rest/v1/properties";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client for listing reads.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ListingsClient {
    client: Client,
    table_url: Url,
    anon_key: String,
}

impl ListingsClient {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self, ListingsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let mut base = Url::parse(base_url)
            .map_err(|e| ListingsError::InvalidConfig(format!("{}: {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let table_url = base
            .join(PROPERTIES_PATH)
            .map_err(|e| ListingsError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            table_url,
            anon_key: anon_key.into(),
        })
    }

    pub fn table_url(&self) -> &Url {
        &self.table_url
    }

    fn headers(&self) -> Result<header::HeaderMap, ListingsError> {
        let invalid = |e: header::InvalidHeaderValue| ListingsError::InvalidConfig(e.to_string());

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        headers.insert("apikey", header::HeaderValue::from_str(&self.anon_key).map_err(invalid)?);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", self.anon_key)).map_err(invalid)?,
        );
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ListingsError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ListingsError::from_status(status, &body))
        }
    }

    async fn get_rows(&self, query: &[(String, String)]) -> Result<Vec<Value>, ListingsError> {
        let response = self
            .client
            .get(self.table_url.clone())
            .headers(self.headers()?)
            .query(query)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        let rows: Vec<Value> = serde_json::from_str(&text)
            .map_err(|e| ListingsError::InvalidResponse(format!("Failed to parse listings: {}", e)))?;

        debug!(rows = rows.len(), "Fetched listings");
        Ok(rows)
    }

    /// All listings, newest first.
    pub async fn fetch_all(&self) -> Result<Vec<Value>, ListingsError> {
        self.get_rows(&ListingFilters::default().to_query()).await
    }

    pub async fn search(&self, filters: &ListingFilters) -> Result<Vec<Value>, ListingsError> {
        self.get_rows(&filters.to_query()).await
    }

    pub async fn fetch_by_id(&self, id: &str) -> Result<Value, ListingsError> {
        let query = vec![
            ("select".to_string(), "*".to_string()),
            ("id".to_string(), format!("eq.{}", id)),
        ];
        self.get_rows(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ListingsError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url_from_bare_host() {
        let client = ListingsClient::new("https://abc.supabase.co", "key").unwrap();
        assert_eq!(client.table_url().as_str(), "https://abc.supabase.co/rest/v1/properties");
    }

    #[test]
    fn test_table_url_keeps_base_path() {
        let client = ListingsClient::new("https://proxy.example.com/backend", "key").unwrap();
        assert_eq!(
            client.table_url().as_str(),
            "https://proxy.example.com/backend/rest/v1/properties"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            ListingsClient::new("not a url", "key"),
            Err(ListingsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_headers_carry_key() {
        let client = ListingsClient::new("https://abc.supabase.co", "anon").unwrap();
        let headers = client.headers().unwrap();
        assert_eq!(headers.get("apikey").unwrap(), "anon");
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer anon");
    }

    #[test]
    fn test_bad_key_is_config_error() {
        let client = ListingsClient::new("https://abc.supabase.co", "bad\nkey").unwrap();
        assert!(matches!(client.headers(), Err(ListingsError::InvalidConfig(_))));
    }
}
