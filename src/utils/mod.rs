//! Utility modules supporting crawl operations.
//!
//! - [`Fetcher`]: retrieves the raw body at a crawl locator
//! - [`HttpClient`]: shared reqwest client implementing `Fetcher`
//! - [`MockFetcher`]: canned responses for tests and demos
//!
//! # Fetching a page
//!
//! ```rust,no_run
//! use research_crawler::models::CrawlLocator;
//! use research_crawler::utils::{Fetcher, HttpClient};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?;
//! let locator = CrawlLocator::parse("https://api.biorxiv.org/details/biorxiv/7d/0")?;
//! let body = client.get(&locator).await?;
//! # Ok(())
//! # }
//! ```

mod http;
pub mod mock;

pub use http::{default_user_agent, FetchError, Fetcher, HttpClient};
pub use mock::MockFetcher;
