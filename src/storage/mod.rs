//! Document storage for research items.
//!
//! The crawl only needs three operations from its store, captured by the
//! [`DocumentStore`] trait:
//!
//! - `query`: documents matching a conjunction of equality predicates
//! - `insert`: write a new document, receiving its id and first revision
//! - `update`: overwrite a document, failing when the supplied revision is not
//!   the currently stored one (optimistic concurrency)
//!
//! [`CouchDbStore`] talks to a CouchDB server over HTTP; [`MemoryStore`] keeps
//! documents in process with the same revision rules.

mod couchdb;
mod memory;

pub use couchdb::CouchDbStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{ResearchItem, RESEARCH_ITEM_TYPE};

/// Storage-assigned identity of a written document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentIdentity {
    pub id: String,
    pub revision: String,
}

/// A document store holding research items
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Documents matching every predicate of `filter`, in store order
    async fn query(&self, filter: &Filter) -> Result<Vec<ResearchItem>, StorageError>;

    /// Write a new document
    async fn insert(&self, item: &ResearchItem) -> Result<DocumentIdentity, StorageError>;

    /// Overwrite an existing document; `item` must carry its id and current revision
    async fn update(&self, item: &ResearchItem) -> Result<DocumentIdentity, StorageError>;
}

/// Conjunction of field equality predicates, always scoped to one document type
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    predicates: Vec<(String, Value)>,
}

impl Filter {
    /// Filter matching every research item document
    pub fn research_items() -> Self {
        Self {
            predicates: vec![("type".to_string(), Value::from(RESEARCH_ITEM_TYPE))],
        }
    }

    /// Research items with the given DOI
    pub fn by_doi(doi: &str) -> Self {
        Self::research_items().eq("doi", doi)
    }

    /// Add an equality predicate
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push((field.into(), value.into()));
        self
    }

    /// Whether a JSON document satisfies every predicate
    pub fn matches(&self, document: &Value) -> bool {
        self.predicates
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }

    /// CouchDB Mango selector for this filter
    pub fn to_selector(&self) -> Value {
        let clauses: Vec<Value> = self
            .predicates
            .iter()
            .map(|(field, value)| serde_json::json!({ field.as_str(): { "$eq": value } }))
            .collect();
        serde_json::json!({ "$and": clauses })
    }
}

/// Errors that can occur when talking to the store
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// The supplied revision is not the stored one
    #[error("Document update conflict: {0}")]
    Conflict(String),

    /// The store refused the request
    #[error("Storage rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// An update was attempted without an id or revision
    #[error("Document has no identity: {0}")]
    MissingIdentity(String),

    /// A response could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// The store is misconfigured
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Parse(format!("JSON: {}", err))
    }
}
