//! bioRxiv/medRxiv site adapter.
//!
//! Both servers expose the same "content detail" API and only differ in host
//! and server segment, so a single adapter covers both. Only the endpoint
//! `https://api.<server>.org/details/<server>/<interval>/<cursor>[/json]` is
//! understood, where `<interval>` is either a `YYYY-MM-DD/YYYY-MM-DD` range or
//! a number (of most recent papers, or days when suffixed with `d`).

use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;

use super::{non_blank, AdapterError, SiteAdapter};
use crate::models::{CrawlLocator, ResearchItem, ResearchItemBuilder};

/// Records returned per page by the details endpoint
const PAGE_SIZE: u64 = 100;

/// Crawl-delay published in the biorxiv.org / medrxiv.org robots.txt
const CRAWL_DELAY_SECONDS: u64 = 7;

/// Groups: 1 host server, 2 path server, 3 range start, 4 range end,
/// 5 numeric interval, 6 cursor, 7 optional format segment.
static DETAILS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https://api\.(biorxiv|medrxiv)\.org/details/(biorxiv|medrxiv)/(?:(\d{4}-\d{2}-\d{2})/(\d{4}-\d{2}-\d{2})|(\d+d?))/(\d+)(/json)?$",
    )
    .expect("details pattern is a valid regex")
});

/// Server type for biorxiv/medrxiv
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerType {
    BioRxiv,
    MedRxiv,
}

impl ServerType {
    fn name(&self) -> &str {
        match self {
            ServerType::BioRxiv => "biorxiv",
            ServerType::MedRxiv => "medrxiv",
        }
    }

    fn display_name(&self) -> &str {
        match self {
            ServerType::BioRxiv => "bioRxiv",
            ServerType::MedRxiv => "medRxiv",
        }
    }

    fn api_host(&self) -> &str {
        match self {
            ServerType::BioRxiv => "api.biorxiv.org",
            ServerType::MedRxiv => "api.medrxiv.org",
        }
    }

    fn content_url(&self, doi: &str, version: Option<u32>) -> String {
        match version {
            Some(v) => format!("https://www.{}.org/content/{}v{}", self.name(), doi, v),
            None => format!("https://www.{}.org/content/{}", self.name(), doi),
        }
    }
}

/// Adapter for the bioRxiv and medRxiv details API
#[derive(Debug, Clone)]
pub struct BiorxivAdapter {
    server_type: ServerType,
}

impl BiorxivAdapter {
    /// Adapter for `api.biorxiv.org`
    pub fn biorxiv() -> Self {
        Self {
            server_type: ServerType::BioRxiv,
        }
    }

    /// Adapter for `api.medrxiv.org`
    pub fn medrxiv() -> Self {
        Self {
            server_type: ServerType::MedRxiv,
        }
    }

    fn map_article(&self, article: Article) -> Result<ResearchItem, AdapterError> {
        let doi = non_blank(article.doi.as_deref())
            .ok_or_else(|| AdapterError::Record("missing doi".to_string()))?;
        let title = non_blank(article.title.as_deref())
            .ok_or_else(|| AdapterError::Record(format!("{}: missing title", doi)))?;
        let authors: Vec<String> = article
            .authors
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if authors.is_empty() {
            return Err(AdapterError::Record(format!("{}: missing authors", doi)));
        }
        let category = non_blank(article.category.as_deref())
            .ok_or_else(|| AdapterError::Record(format!("{}: missing category", doi)))?;

        // Everything below is optional; a bad value never drops the record.
        let version = article.version.as_ref().and_then(parse_version);
        let content_url = self.server_type.content_url(&doi, version);

        let mut builder = ResearchItemBuilder::new(doi.clone(), title)
            .authors(authors)
            .category(category)
            .create_date(Utc::now())
            .source_url(format!("{}.full.pdf", content_url))
            .detail_url(content_url);

        if let Some(v) = version {
            builder = builder.version(v);
        }
        if let Some(author) = non_blank(article.author_corresponding.as_deref()) {
            builder = builder.author_corresponding(author);
        }
        if let Some(institution) = non_blank(article.author_corresponding_institution.as_deref()) {
            builder = builder.author_corresponding_institution(institution);
        }
        if let Some(published) =
            non_blank(article.published.as_deref()).filter(|p| !p.eq_ignore_ascii_case("NA"))
        {
            builder = builder.publication_detail(published);
        }
        if let Some(abstract_text) = non_blank(article.r#abstract.as_deref()) {
            builder = builder.abstract_text(abstract_text);
        }
        if let Some(date) = non_blank(article.date.as_deref()) {
            match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
                Ok(date) => builder = builder.publication_date(date),
                Err(e) => tracing::warn!(
                    "Unable to parse publication date '{}' of {} from {}: {}",
                    date,
                    doi,
                    self.server_type.api_host(),
                    e
                ),
            }
        }

        Ok(builder.build())
    }
}

impl Default for BiorxivAdapter {
    fn default() -> Self {
        Self::biorxiv()
    }
}

impl SiteAdapter for BiorxivAdapter {
    fn id(&self) -> &str {
        self.server_type.name()
    }

    fn name(&self) -> &str {
        self.server_type.display_name()
    }

    fn host(&self) -> &str {
        self.server_type.api_host()
    }

    fn extract_items(&self, body: &str) -> Result<Vec<ResearchItem>, AdapterError> {
        let response: ApiResponse = serde_json::from_str(body)?;

        let mut items = Vec::with_capacity(response.collection.len());
        for record in response.collection {
            let mapped = serde_json::from_value::<Article>(record.clone())
                .map_err(AdapterError::from)
                .and_then(|article| self.map_article(article));

            match mapped {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(
                    "Skipping record from {} that does not meet the minimum criteria ({}): {}",
                    self.server_type.api_host(),
                    e,
                    record
                ),
            }
        }

        Ok(items)
    }

    fn next_locator(&self, current: &CrawlLocator) -> Option<CrawlLocator> {
        let Some(caps) = DETAILS_PATTERN.captures(current.as_str()) else {
            tracing::error!(
                "Couldn't assemble next page locator for '{}': not a {} details URL",
                current,
                self.name()
            );
            return None;
        };

        let host_server = &caps[1];
        let path_server = &caps[2];
        if host_server != self.server_type.name() || path_server != self.server_type.name() {
            tracing::error!(
                "Couldn't assemble next page locator for '{}': not a {} details URL",
                current,
                self.name()
            );
            return None;
        }

        let interval = match (caps.get(3), caps.get(4), caps.get(5)) {
            (Some(from), Some(to), _) => format!("{}/{}", from.as_str(), to.as_str()),
            (_, _, Some(interval)) => interval.as_str().to_string(),
            _ => return None,
        };

        let Some(cursor) = caps[6]
            .parse::<u64>()
            .ok()
            .and_then(|c| c.checked_add(PAGE_SIZE))
        else {
            tracing::error!("Cursor of '{}' is out of range", current);
            return None;
        };
        let format = caps.get(7).map(|m| m.as_str()).unwrap_or_default();

        let next = format!(
            "https://{}/details/{}/{}/{}{}",
            self.server_type.api_host(),
            self.server_type.name(),
            interval,
            cursor,
            format
        );

        match CrawlLocator::parse(&next) {
            Ok(locator) => Some(locator),
            Err(e) => {
                tracing::error!("Couldn't assemble next page locator for '{}': {}", current, e);
                None
            }
        }
    }

    fn crawl_delay_seconds(&self) -> u64 {
        CRAWL_DELAY_SECONDS
    }
}

/// The API reports versions as strings ("2"); accept plain integers as well.
fn parse_version(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// API response structure for bioRxiv/medRxiv
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "collection", default)]
    collection: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    title: Option<String>,
    /// Semicolon-separated
    #[serde(default)]
    authors: Option<String>,
    #[serde(default)]
    author_corresponding: Option<String>,
    #[serde(default)]
    author_corresponding_institution: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    version: Option<serde_json::Value>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    published: Option<String>,
    #[serde(rename = "abstract", default)]
    r#abstract: Option<String>,
}
