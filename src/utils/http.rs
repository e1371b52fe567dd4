//! HTTP fetching of crawl pages.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::models::CrawlLocator;

/// Errors that can occur while fetching a page
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure (connection, timeout, body read)
    #[error("Network error fetching '{url}': {message}")]
    Network { url: String, message: String },

    /// The server answered with a non-success status
    #[error("'{url}' returned status {status}")]
    Status { url: String, status: u16 },

    /// The client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Retrieves the raw body found at a locator.
///
/// Any non-success status or transport failure is an error for that fetch.
#[async_trait]
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    async fn get(&self, locator: &CrawlLocator) -> Result<String, FetchError>;
}

/// Shared HTTP client with sensible defaults
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, FetchError> {
        Self::with_options(default_user_agent(), Duration::from_secs(30))
    }

    /// Create a new HTTP client with a custom user agent and request timeout
    pub fn with_options(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// `<crate name>/<version>`
pub fn default_user_agent() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn get(&self, locator: &CrawlLocator) -> Result<String, FetchError> {
        let url = locator.as_str();
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(network)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(network)
    }
}
