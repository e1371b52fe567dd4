//! In-memory fetcher for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::http::{FetchError, Fetcher};
use crate::models::CrawlLocator;

#[derive(Debug, Clone)]
enum MockResponse {
    Body(String),
    Status(u16),
}

/// A fetcher serving predefined bodies keyed by URL.
///
/// Unknown URLs answer with status 404. Every request is recorded in order.
#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, MockResponse>>,
    requests: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

impl MockFetcher {
    /// Create a new mock fetcher with no pages
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Serve `body` at `url`
    pub fn set_body(&self, url: impl Into<String>, body: impl Into<String>) {
        let mut guard = self.responses.lock().unwrap();
        guard.insert(url.into(), MockResponse::Body(body.into()));
    }

    /// Answer `url` with an error status
    pub fn set_status(&self, url: impl Into<String>, status: u16) {
        let mut guard = self.responses.lock().unwrap();
        guard.insert(url.into(), MockResponse::Status(status));
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests made so far
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn get(&self, locator: &CrawlLocator) -> Result<String, FetchError> {
        let url = locator.as_str().to_string();
        self.requests.lock().unwrap().push(url.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = self.responses.lock().unwrap().get(&url).cloned();
        match response {
            Some(MockResponse::Body(body)) => Ok(body),
            Some(MockResponse::Status(status)) => Err(FetchError::Status { url, status }),
            None => Err(FetchError::Status { url, status: 404 }),
        }
    }
}
