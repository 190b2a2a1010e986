//! Scripted network double for strategy and controller tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Semaphore;

use super::{FetchError, Fetcher, Request, Response};

pub(crate) struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    held: AtomicBool,
    gate: Semaphore,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    /// Serve `body` with 200 for `url`.
    pub(crate) fn serve(&self, url: &str, body: &'static str) {
        self.serve_response(url, Response::new(StatusCode::OK, body));
    }

    pub(crate) fn serve_response(&self, url: &str, response: Response) {
        self.responses.lock().unwrap().insert(url.to_string(), response);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every fetch wait until `release` is called.
    pub(crate) fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let key = request.cache_key();
        self.calls.lock().unwrap().push(key.clone());

        if self.held.load(Ordering::SeqCst) {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| FetchError::Unreachable(e.to_string()))?;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(key));
        }

        let response = self.responses.lock().unwrap().get(&key).cloned();
        Ok(response.unwrap_or_else(|| Response::new(StatusCode::NOT_FOUND, "Not Found")))
    }
}
