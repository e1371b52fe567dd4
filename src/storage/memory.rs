//! In-process document store.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use super::{DocumentIdentity, DocumentStore, Filter, StorageError};
use crate::models::ResearchItem;

#[derive(Debug, Default)]
struct MemoryState {
    documents: Vec<ResearchItem>,
    sequence: u64,
    inserts: usize,
    updates: usize,
    queries: usize,
    failing_dois: HashSet<String>,
}

impl MemoryState {
    fn next_revision(&mut self, generation: u64) -> String {
        self.sequence += 1;
        format!("{}-{:016x}", generation, self.sequence)
    }
}

/// Document store kept in memory, applying CouchDB's revision rules.
///
/// Used for dry runs and tests. Writes for chosen DOIs can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every query by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every write of the given DOI fail
    pub fn fail_writes_for(&self, doi: impl Into<String>) {
        self.state.lock().unwrap().failing_dois.insert(doi.into());
    }

    /// Snapshot of the stored documents, in insertion order
    pub fn documents(&self) -> Vec<ResearchItem> {
        self.state.lock().unwrap().documents.clone()
    }

    /// Stored documents with the given DOI
    pub fn find_by_doi(&self, doi: &str) -> Vec<ResearchItem> {
        self.state
            .lock()
            .unwrap()
            .documents
            .iter()
            .filter(|d| d.doi == doi)
            .cloned()
            .collect()
    }

    /// Number of successful inserts
    pub fn insert_count(&self) -> usize {
        self.state.lock().unwrap().inserts
    }

    /// Number of successful updates
    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates
    }

    /// Number of queries answered
    pub fn query_count(&self) -> usize {
        self.state.lock().unwrap().queries
    }

    fn rejected(doi: &str) -> StorageError {
        StorageError::Rejected {
            status: 500,
            message: format!("write of {} refused", doi),
        }
    }
}

fn generation(revision: &str) -> u64 {
    revision
        .split_once('-')
        .and_then(|(n, _)| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, filter: &Filter) -> Result<Vec<ResearchItem>, StorageError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().unwrap();
        state.queries += 1;

        let mut found = Vec::new();
        for doc in &state.documents {
            if filter.matches(&serde_json::to_value(doc)?) {
                found.push(doc.clone());
            }
        }
        Ok(found)
    }

    async fn insert(&self, item: &ResearchItem) -> Result<DocumentIdentity, StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_dois.contains(&item.doi) {
            return Err(Self::rejected(&item.doi));
        }

        let id = match &item.id {
            Some(id) if state.documents.iter().any(|d| d.id.as_ref() == Some(id)) => {
                return Err(StorageError::Conflict(format!("document {} exists", id)));
            }
            Some(id) => id.clone(),
            None => format!("{:032x}", state.sequence + 1),
        };
        let revision = state.next_revision(1);

        let mut stored = item.clone();
        stored.id = Some(id.clone());
        stored.revision = Some(revision.clone());
        state.documents.push(stored);
        state.inserts += 1;

        Ok(DocumentIdentity { id, revision })
    }

    async fn update(&self, item: &ResearchItem) -> Result<DocumentIdentity, StorageError> {
        let (Some(id), Some(revision)) = (item.id.clone(), item.revision.clone()) else {
            return Err(StorageError::MissingIdentity(item.doi.clone()));
        };

        let mut state = self.state.lock().unwrap();
        if state.failing_dois.contains(&item.doi) {
            return Err(Self::rejected(&item.doi));
        }

        let Some(index) = state
            .documents
            .iter()
            .position(|d| d.id.as_deref() == Some(id.as_str()))
        else {
            return Err(StorageError::Conflict(format!("document {} missing", id)));
        };
        if state.documents[index].revision.as_deref() != Some(revision.as_str()) {
            return Err(StorageError::Conflict(format!(
                "document {} is not at revision {}",
                id, revision
            )));
        }

        let next = state.next_revision(generation(&revision) + 1);
        let mut stored = item.clone();
        stored.revision = Some(next.clone());
        state.documents[index] = stored;
        state.updates += 1;

        Ok(DocumentIdentity { id, revision: next })
    }
}
