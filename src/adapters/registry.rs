//! Registry mapping site hosts to their adapters.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ArxivAdapter, BiorxivAdapter, SiteAdapter};
use crate::crawl::CrawlError;
use crate::models::CrawlLocator;

/// Registry for all supported sites
///
/// Adapters are keyed by the exact host they serve. The registry is populated
/// once at startup and shared read-only (behind an `Arc`) by every crawl run.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn SiteAdapter>>,
}

impl AdapterRegistry {
    /// Create a new registry with all supported sites
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(BiorxivAdapter::biorxiv()));
        registry.register(Arc::new(BiorxivAdapter::medrxiv()));
        registry.register(Arc::new(ArxivAdapter::new()));

        registry
    }

    /// Create a registry with no adapters
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter under its host, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) {
        self.adapters.insert(adapter.host().to_string(), adapter);
    }

    /// Get an adapter by host
    pub fn get(&self, host: &str) -> Option<&Arc<dyn SiteAdapter>> {
        self.adapters.get(host)
    }

    /// Get an adapter by host, returning an error if none is registered
    pub fn get_required(&self, host: &str) -> Result<&Arc<dyn SiteAdapter>, CrawlError> {
        self.get(host)
            .ok_or_else(|| CrawlError::NoAdapter(host.to_string()))
    }

    /// Adapter responsible for a locator
    pub fn for_locator(&self, locator: &CrawlLocator) -> Result<&Arc<dyn SiteAdapter>, CrawlError> {
        self.get_required(locator.host())
    }

    /// Get all registered adapters
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn SiteAdapter>> {
        self.adapters.values()
    }

    /// Get all registered hosts
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(|s| s.as_str())
    }

    /// Check if an adapter exists for a host
    pub fn has(&self, host: &str) -> bool {
        self.adapters.contains_key(host)
    }

    /// Get the number of registered adapters
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
