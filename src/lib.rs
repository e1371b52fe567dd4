//! # Research Crawler
//!
//! Harvests research item metadata from scholarly APIs and persists it into a
//! document store, deduplicating by DOI and keeping locally owned vote
//! counters across re-crawls.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (ResearchItem, CrawlLocator)
//! - [`adapters`]: Per-site extraction and pagination strategies
//! - [`crawl`]: Hand-off queue, producer, consumer and the session tying them together
//! - [`storage`]: Document store trait with CouchDB and in-memory implementations
//! - [`utils`]: HTTP fetching
//! - [`config`]: Configuration management

pub mod adapters;
pub mod config;
pub mod crawl;
pub mod models;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use adapters::{AdapterRegistry, SiteAdapter};
pub use crawl::{CrawlSession, CrawlSettings, RunHandle, RunStatus};
pub use models::{CrawlLocator, ResearchItem};
pub use storage::{CouchDbStore, DocumentStore, MemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
