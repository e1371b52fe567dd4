//! Research item model persisted as a JSON document.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Value of the `type` field carried by every research item document
pub const RESEARCH_ITEM_TYPE: &str = "researchItem";

fn default_doc_type() -> String {
    RESEARCH_ITEM_TYPE.to_string()
}

/// Bibliographic metadata for one research item, keyed naturally by DOI.
///
/// The same struct is used for freshly extracted candidates (no storage
/// identity yet) and for documents read back from the store. The vote
/// counters belong to the appraisal side of the application; the crawl only
/// ever carries them forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchItem {
    /// Storage-assigned document id
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Storage-assigned revision token, required for updates
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// Document type discriminator
    #[serde(rename = "type", default = "default_doc_type")]
    pub doc_type: String,

    /// Digital Object Identifier (natural key)
    pub doi: String,

    /// Item title
    #[serde(default)]
    pub title: String,

    /// Ordered author names
    #[serde(default)]
    pub authors: Vec<String>,

    /// Subject category
    #[serde(default)]
    pub category: String,

    /// Publication date as reported by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,

    /// When the item was first seen; never changes after creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<DateTime<Utc>>,

    /// Landing page URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,

    /// Full-text URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_corresponding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_corresponding_institution: Option<String>,

    /// Source-reported version, monotonic per DOI
    #[serde(rename = "archiveVersion", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Journal publication detail (e.g. the published DOI or journal reference)
    #[serde(rename = "publishDetails", default, skip_serializing_if = "Option::is_none")]
    pub publication_detail: Option<String>,

    /// Abstract text
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub r#abstract: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes_votes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_votes: Option<u32>,
}

impl ResearchItem {
    /// Create a new item with the natural key and title
    pub fn new(doi: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            revision: None,
            doc_type: default_doc_type(),
            doi: doi.into(),
            title: title.into(),
            authors: Vec::new(),
            category: String::new(),
            publication_date: None,
            create_date: None,
            detail_url: None,
            source_url: None,
            author_corresponding: None,
            author_corresponding_institution: None,
            version: None,
            publication_detail: None,
            r#abstract: None,
            yes_votes: None,
            no_votes: None,
        }
    }

    /// Whether the item carries everything required to be persisted:
    /// a DOI, a title, at least one author and a category.
    pub fn meets_minimum_criteria(&self) -> bool {
        !self.doi.trim().is_empty()
            && !self.title.trim().is_empty()
            && self.authors.iter().any(|a| !a.trim().is_empty())
            && !self.category.trim().is_empty()
    }

    /// Whether the item has already been written at least once
    pub fn has_revision(&self) -> bool {
        self.revision.is_some()
    }

    /// Take over the storage identity, creation date and vote counters of an
    /// existing document for the same DOI. Every descriptive field is left as is.
    pub fn adopt_identity(&mut self, existing: &ResearchItem) {
        self.id = existing.id.clone();
        self.revision = existing.revision.clone();
        self.create_date = existing.create_date;
        self.yes_votes = existing.yes_votes;
        self.no_votes = existing.no_votes;
    }
}

impl std::fmt::Display for ResearchItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.version {
            Some(v) => write!(f, "{} (v{})", self.doi, v),
            None => write!(f, "{}", self.doi),
        }
    }
}

/// Builder for constructing ResearchItem objects
#[derive(Debug, Clone)]
pub struct ResearchItemBuilder {
    item: ResearchItem,
}

impl ResearchItemBuilder {
    /// Create a new builder with required fields
    pub fn new(doi: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            item: ResearchItem::new(doi, title),
        }
    }

    /// Set authors
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.item.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Set category
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.item.category = category.into();
        self
    }

    pub fn publication_date(mut self, date: NaiveDate) -> Self {
        self.item.publication_date = Some(date);
        self
    }

    pub fn create_date(mut self, date: DateTime<Utc>) -> Self {
        self.item.create_date = Some(date);
        self
    }

    pub fn detail_url(mut self, url: impl Into<String>) -> Self {
        self.item.detail_url = Some(url.into());
        self
    }

    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.item.source_url = Some(url.into());
        self
    }

    pub fn author_corresponding(mut self, author: impl Into<String>) -> Self {
        self.item.author_corresponding = Some(author.into());
        self
    }

    pub fn author_corresponding_institution(mut self, institution: impl Into<String>) -> Self {
        self.item.author_corresponding_institution = Some(institution.into());
        self
    }

    /// Set the source-reported version
    pub fn version(mut self, version: u32) -> Self {
        self.item.version = Some(version);
        self
    }

    pub fn publication_detail(mut self, detail: impl Into<String>) -> Self {
        self.item.publication_detail = Some(detail.into());
        self
    }

    /// Set abstract
    pub fn abstract_text(mut self, abstract_text: impl Into<String>) -> Self {
        self.item.r#abstract = Some(abstract_text.into());
        self
    }

    /// Set both vote counters
    pub fn votes(mut self, yes: u32, no: u32) -> Self {
        self.item.yes_votes = Some(yes);
        self.item.no_votes = Some(no);
        self
    }

    /// Build the ResearchItem
    pub fn build(self) -> ResearchItem {
        self.item
    }
}
