//! Crawl locators: positions inside a paginated external resource.

use std::fmt;
use std::str::FromStr;

use url::Url;

/// Errors raised when a string cannot be used as a locator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    #[error("Invalid locator '{0}': {1}")]
    Invalid(String, String),

    #[error("Locator '{0}' has no host")]
    MissingHost(String),
}

/// Opaque position in a paginated resource.
///
/// Only the adapter that produced a locator knows how to interpret its path
/// and query. The crawl core reads nothing but the host, which selects the
/// adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrawlLocator {
    url: Url,
}

impl CrawlLocator {
    /// Parse an absolute URL into a locator
    pub fn parse(input: &str) -> Result<Self, LocatorError> {
        let url = Url::parse(input.trim())
            .map_err(|e| LocatorError::Invalid(input.to_string(), e.to_string()))?;
        Self::try_from(url)
    }

    /// Host used to select the adapter
    pub fn host(&self) -> &str {
        // Construction guarantees a host.
        self.url.host_str().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }
}

impl TryFrom<Url> for CrawlLocator {
    type Error = LocatorError;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        match url.host_str() {
            Some(host) if !host.is_empty() => Ok(Self { url }),
            _ => Err(LocatorError::MissingHost(url.to_string())),
        }
    }
}

impl FromStr for CrawlLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CrawlLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
