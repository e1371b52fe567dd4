//! Mock adapter for testing purposes.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{AdapterError, SiteAdapter};
use crate::models::{CrawlLocator, ResearchItem};

/// Host served by [`MockAdapter`]
pub const MOCK_HOST: &str = "mock.local";

/// A mock adapter whose pages are `http://mock.local/page/<n>` and whose
/// bodies are JSON arrays of research item documents.
///
/// Pagination ends after `last_page`. Records that cannot be deserialized are
/// skipped; the minimum criteria are deliberately not checked so callers can
/// exercise the crawl's own validation.
#[derive(Debug)]
pub struct MockAdapter {
    last_page: u32,
    delay_seconds: u64,
    extract_calls: AtomicUsize,
}

impl MockAdapter {
    /// Create a mock adapter paginating from page 1 up to `last_page`
    pub fn new(last_page: u32) -> Self {
        Self {
            last_page,
            delay_seconds: 0,
            extract_calls: AtomicUsize::new(0),
        }
    }

    /// Set the crawl delay reported to the producer
    pub fn with_delay_seconds(mut self, delay_seconds: u64) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }

    /// Number of bodies handed to `extract_items` so far
    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    fn page_number(locator: &CrawlLocator) -> Option<u32> {
        locator
            .as_url()
            .path()
            .strip_prefix("/page/")
            .and_then(|n| n.parse().ok())
    }
}

impl SiteAdapter for MockAdapter {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock Site"
    }

    fn host(&self) -> &str {
        MOCK_HOST
    }

    fn extract_items(&self, body: &str) -> Result<Vec<ResearchItem>, AdapterError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);

        let records: Vec<serde_json::Value> = serde_json::from_str(body)?;
        Ok(records
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<ResearchItem>(record) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("Skipping malformed mock record: {}", e);
                    None
                }
            })
            .collect())
    }

    fn next_locator(&self, current: &CrawlLocator) -> Option<CrawlLocator> {
        let Some(page) = Self::page_number(current) else {
            tracing::error!("Couldn't assemble next page locator for '{}'", current);
            return None;
        };
        if page >= self.last_page {
            return None;
        }
        CrawlLocator::parse(&page_url(page + 1)).ok()
    }

    fn crawl_delay_seconds(&self) -> u64 {
        self.delay_seconds
    }
}

/// Locator string of the given mock page
pub fn page_url(page: u32) -> String {
    format!("http://{}/page/{}", MOCK_HOST, page)
}

/// JSON record for a mock page body
pub fn record(doi: &str, version: Option<u32>) -> serde_json::Value {
    let mut record = serde_json::json!({
        "type": "researchItem",
        "doi": doi,
        "title": format!("Title of {}", doi),
        "authors": ["Test Author"],
        "category": "testing",
    });
    if let Some(v) = version {
        record["archiveVersion"] = serde_json::json!(v);
    }
    record
}

/// Mock page body holding the given records
pub fn page_body(records: &[serde_json::Value]) -> String {
    serde_json::Value::Array(records.to_vec()).to_string()
}
