//! Minimal request/response model passed between the router, the network,
//! and bucket storage.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// Header set on synthetic offline responses so callers can tell them apart
/// from a real 503 from the server.
pub const OFFLINE_MARKER_HEADER: &str = "x-listcache-offline";

/// What the page intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    #[default]
    Other,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub destination: Destination,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            destination: Destination::Other,
        }
    }

    /// Top-level page load.
    pub fn navigate(url: Url) -> Self {
        Self::get(url)
            .with_header(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"))
            .with_destination(Destination::Document)
    }

    pub fn image(url: Url) -> Self {
        Self::get(url)
            .with_header(ACCEPT, HeaderValue::from_static("image/avif,image/webp,image/*"))
            .with_destination(Destination::Image)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn accepts_html(&self) -> bool {
        self.headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false)
    }

    /// Identity used to store and look up this request: the URL without
    /// its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Final URL after redirects, when the response came off the network.
    pub url: Option<Url>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            url: None,
        }
    }

    /// Synthetic response for a request that could be served neither from
    /// the network nor from the bucket.
    pub fn offline() -> Self {
        let mut response = Self::new(StatusCode::SERVICE_UNAVAILABLE, Bytes::from_static(b"Offline"));
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response.headers.insert(
            HeaderName::from_static(OFFLINE_MARKER_HEADER),
            HeaderValue::from_static("1"),
        );
        response
    }

    pub fn is_offline_fallback(&self) -> bool {
        self.headers.contains_key(OFFLINE_MARKER_HEADER)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_cache_key_drops_fragment() {
        let request = Request::get(url("https://example.com/properties.html?page=2#top"));
        assert_eq!(request.cache_key(), "https://example.com/properties.html?page=2");
    }

    #[test]
    fn test_accepts_html() {
        assert!(Request::navigate(url("https://example.com/")).accepts_html());
        assert!(!Request::image(url("https://example.com/a.png")).accepts_html());
        // No Accept header at all
        assert!(!Request::get(url("https://example.com/api")).accepts_html());
    }

    #[test]
    fn test_offline_response_is_marked() {
        let response = Response::offline();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.is_offline_fallback());
        assert!(!response.is_success());

        let server_error = Response::new(StatusCode::SERVICE_UNAVAILABLE, "busy");
        assert!(!server_error.is_offline_fallback());
    }
}
