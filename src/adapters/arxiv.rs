//! arXiv site adapter for the Atom query API (`export.arxiv.org/api/query`).

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use url::Url;

use super::{non_blank, AdapterError, SiteAdapter};
use crate::models::{CrawlLocator, ResearchItem, ResearchItemBuilder};

const ARXIV_API_HOST: &str = "export.arxiv.org";

/// DataCite prefix under which arXiv registers a DOI for every paper
const ARXIV_DOI_PREFIX: &str = "10.48550/arXiv.";

/// Page size the API uses when `max_results` is absent
const DEFAULT_MAX_RESULTS: u64 = 10;

/// arXiv API terms of use: no more than one request every three seconds
const CRAWL_DELAY_SECONDS: u64 = 3;

/// Splits "2301.12345v2" or "hep-th/9901001v1" into id and version
static VERSIONED_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<id>.+?)(?:v(?P<version>\d+))?$").expect("versioned id pattern is a valid regex")
});

/// arXiv research adapter
#[derive(Debug, Clone, Default)]
pub struct ArxivAdapter;

impl ArxivAdapter {
    pub fn new() -> Self {
        Self
    }

    fn map_entry(&self, entry: feed_rs::model::Entry) -> Result<ResearchItem, AdapterError> {
        let abs_id = entry
            .id
            .rsplit_once("/abs/")
            .map(|(_, id)| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AdapterError::Record(format!("unexpected entry id '{}'", entry.id)))?;

        let caps = VERSIONED_ID
            .captures(&abs_id)
            .ok_or_else(|| AdapterError::Record(format!("unexpected entry id '{}'", entry.id)))?;
        let arxiv_id = caps["id"].to_string();
        let version = caps
            .name("version")
            .and_then(|v| v.as_str().parse::<u32>().ok());

        let title = entry
            .title
            .as_ref()
            .map(|t| collapse_whitespace(&t.content))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdapterError::Record(format!("{}: missing title", arxiv_id)))?;

        let authors: Vec<String> = entry
            .authors
            .iter()
            .filter_map(|p| non_blank(Some(p.name.as_str())))
            .collect();
        if authors.is_empty() {
            return Err(AdapterError::Record(format!("{}: missing authors", arxiv_id)));
        }

        let category = entry
            .categories
            .iter()
            .find_map(|c| non_blank(Some(c.term.as_str())))
            .ok_or_else(|| AdapterError::Record(format!("{}: missing category", arxiv_id)))?;

        let mut builder = ResearchItemBuilder::new(format!("{}{}", ARXIV_DOI_PREFIX, arxiv_id), title)
            .authors(authors)
            .category(category)
            .create_date(Utc::now());

        if let Some(v) = version {
            builder = builder.version(v);
        }
        if let Some(summary) = entry.summary.as_ref().map(|s| collapse_whitespace(&s.content)) {
            if !summary.is_empty() {
                builder = builder.abstract_text(summary);
            }
        }
        if let Some(published) = entry.published {
            builder = builder.publication_date(published.date_naive());
        }

        let mut detail_url = None;
        for link in &entry.links {
            match (link.rel.as_deref(), link.media_type.as_deref(), link.title.as_deref()) {
                (_, _, Some("doi")) => {
                    // Journal DOI of the published version
                    let journal_doi = link
                        .href
                        .split_once("doi.org/")
                        .map(|(_, doi)| doi.to_string())
                        .unwrap_or_else(|| link.href.clone());
                    builder = builder.publication_detail(journal_doi);
                }
                (_, Some("application/pdf"), _) | (_, _, Some("pdf")) => {
                    builder = builder.source_url(link.href.clone());
                }
                (Some("alternate"), _, _) => detail_url = Some(link.href.clone()),
                _ => {}
            }
        }
        builder = builder.detail_url(detail_url.unwrap_or_else(|| entry.id.clone()));

        Ok(builder.build())
    }
}

impl SiteAdapter for ArxivAdapter {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    fn host(&self) -> &str {
        ARXIV_API_HOST
    }

    fn extract_items(&self, body: &str) -> Result<Vec<ResearchItem>, AdapterError> {
        let feed = feed_rs::parser::parse(body.as_bytes())
            .map_err(|e| AdapterError::Parse(format!("Atom: {}", e)))?;

        let mut items = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            let entry_id = entry.id.clone();
            match self.map_entry(entry) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(
                    "Skipping arXiv entry '{}' that does not meet the minimum criteria: {}",
                    entry_id,
                    e
                ),
            }
        }

        Ok(items)
    }

    fn next_locator(&self, current: &CrawlLocator) -> Option<CrawlLocator> {
        let url = current.as_url();
        if url.host_str() != Some(ARXIV_API_HOST) || url.path() != "/api/query" {
            tracing::error!("Couldn't assemble next page locator for '{}': not an arXiv query", current);
            return None;
        }

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if !pairs
            .iter()
            .any(|(k, _)| k == "search_query" || k == "id_list")
        {
            tracing::error!(
                "Couldn't assemble next page locator for '{}': no search_query or id_list",
                current
            );
            return None;
        }

        let numeric = |key: &str, default: u64| -> Result<u64, String> {
            match pairs.iter().find(|(k, _)| k == key) {
                Some((_, v)) => v.parse::<u64>().map_err(|e| format!("{}={}: {}", key, v, e)),
                None => Ok(default),
            }
        };
        let next_start = match (numeric("start", 0), numeric("max_results", DEFAULT_MAX_RESULTS)) {
            (Ok(start), Ok(step)) if step > 0 => start.checked_add(step),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("Couldn't assemble next page locator for '{}': {}", current, e);
                return None;
            }
            _ => None,
        };
        let Some(next_start) = next_start else {
            tracing::error!("Couldn't assemble next page locator for '{}'", current);
            return None;
        };

        let mut next: Url = url.clone();
        {
            let mut query = next.query_pairs_mut();
            query.clear();
            let mut wrote_start = false;
            for (k, v) in &pairs {
                if k == "start" {
                    query.append_pair(k, &next_start.to_string());
                    wrote_start = true;
                } else {
                    query.append_pair(k, v);
                }
            }
            if !wrote_start {
                query.append_pair("start", &next_start.to_string());
            }
        }

        CrawlLocator::try_from(next).ok()
    }

    fn crawl_delay_seconds(&self) -> u64 {
        CRAWL_DELAY_SECONDS
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
