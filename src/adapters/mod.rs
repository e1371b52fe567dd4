//! Site adapters: per-domain extraction and pagination strategies.
//!
//! This module defines the [`SiteAdapter`] trait that every supported site
//! implements. An adapter knows three things about its site:
//!
//! - how to turn a response body into [`ResearchItem`]s
//! - how to compute the locator of the page after a given one
//! - how long to wait between two requests (the site's crawl delay)
//!
//! Adapters are selected by the exact host of the starting locator through the
//! [`AdapterRegistry`]. The default registry holds a fixed set of adapters:
//!
//! - `api.biorxiv.org` - bioRxiv content detail endpoint
//! - `api.medrxiv.org` - medRxiv content detail endpoint
//! - `export.arxiv.org` - arXiv Atom query API
//!
//! # Adding a Site
//!
//! 1. Create a new struct that implements `SiteAdapter`
//! 2. Register it in `AdapterRegistry::new()`

mod arxiv;
mod biorxiv;
pub mod mock;
mod registry;

pub use arxiv::ArxivAdapter;
pub use biorxiv::BiorxivAdapter;
pub use mock::MockAdapter;
pub use registry::AdapterRegistry;

use std::time::Duration;

use crate::models::{CrawlLocator, ResearchItem};

/// Strategy object translating one site's content into research items and
/// pagination hints.
pub trait SiteAdapter: Send + Sync + std::fmt::Debug {
    /// Short identifier (e.g., "biorxiv")
    fn id(&self) -> &str;

    /// Human-readable name of the site
    fn name(&self) -> &str;

    /// Exact host this adapter serves (e.g., "api.biorxiv.org")
    fn host(&self) -> &str;

    /// Convert a response body into candidate items, in page order.
    ///
    /// A record that cannot be mapped is logged and skipped; only a body that
    /// cannot be read at all is an error.
    fn extract_items(&self, body: &str) -> Result<Vec<ResearchItem>, AdapterError>;

    /// Locator of the page following `current`, or `None` when there is none
    /// or `current` is not understood.
    fn next_locator(&self, current: &CrawlLocator) -> Option<CrawlLocator>;

    /// Mandatory pause between two requests to this site, in seconds
    fn crawl_delay_seconds(&self) -> u64;

    /// Crawl delay as a `Duration`
    fn crawl_delay(&self) -> Duration {
        Duration::from_secs(self.crawl_delay_seconds())
    }
}

/// Errors produced while reading a site's content
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The body as a whole could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// A single record could not be mapped to an item
    #[error("Record error: {0}")]
    Record(String),
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Parse(format!("JSON: {}", err))
    }
}

/// Trimmed copy of an optional string, `None` when blank
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  x ")), Some("x".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_default_crawl_delay() {
        let adapter = MockAdapter::new(1).with_delay_seconds(2);
        assert_eq!(adapter.crawl_delay(), Duration::from_secs(2));
    }
}
