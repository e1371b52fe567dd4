//! Long-lived consumer persisting queued items with DOI deduplication.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::queue::QueueReceiver;
use crate::models::ResearchItem;
use crate::storage::{DocumentStore, Filter, StorageError};

/// What happened to one dequeued item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    Updated,
    /// The stored version is the same or newer; nothing was written
    Discarded,
}

/// Running totals of a consumer loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub inserted: usize,
    pub updated: usize,
    pub discarded: usize,
    pub failed: usize,
}

impl ConsumerStats {
    /// Items taken off the queue and fully handled
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.discarded + self.failed
    }

    fn record(&mut self, outcome: PersistOutcome) {
        match outcome {
            PersistOutcome::Inserted => self.inserted += 1,
            PersistOutcome::Updated => self.updated += 1,
            PersistOutcome::Discarded => self.discarded += 1,
        }
    }
}

/// `existing - incoming`, where a missing version on either side makes the
/// incoming item strictly newer (`-1`).
pub fn compare_versions(existing: Option<u32>, incoming: Option<u32>) -> i64 {
    match (existing, incoming) {
        (Some(existing), Some(incoming)) => i64::from(existing) - i64::from(incoming),
        _ => -1,
    }
}

/// Takes items off the hand-off queue one at a time and upserts them.
///
/// For every item the store is asked for a research item with the same DOI.
/// Unknown DOIs are inserted. A known DOI is only overwritten by a strictly
/// newer version, and the overwrite keeps the stored id, revision, creation
/// date and vote counters.
#[derive(Debug)]
pub struct CrawlConsumer {
    store: Arc<dyn DocumentStore>,
    queue: QueueReceiver,
}

impl CrawlConsumer {
    pub fn new(store: Arc<dyn DocumentStore>, queue: QueueReceiver) -> Self {
        Self { store, queue }
    }

    /// Consume until `cancel` fires or every sender is gone and the queue is empty.
    ///
    /// A failed write is logged and counted; the loop moves on to the next item.
    pub async fn run(mut self, cancel: CancellationToken) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        tracing::debug!("Consumer started");

        while let Some(item) = self.queue.take(&cancel).await {
            let existing = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                found = self.find_existing(&item) => found,
            };

            // Writes are not raced against cancellation.
            let result = match existing {
                Ok(existing) => self.write(item.clone(), existing).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => {
                    tracing::debug!("{} {:?}", item, outcome);
                    stats.record(outcome);
                }
                Err(e) => {
                    tracing::error!("Failed to persist {}: {}", item, e);
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(
            "Consumer stopped: {} inserted, {} updated, {} discarded, {} failed",
            stats.inserted,
            stats.updated,
            stats.discarded,
            stats.failed
        );
        stats
    }

    /// Persist a single item.
    pub async fn persist(&self, item: ResearchItem) -> Result<PersistOutcome, StorageError> {
        let existing = self.find_existing(&item).await?;
        self.write(item, existing).await
    }

    async fn find_existing(&self, item: &ResearchItem) -> Result<Option<ResearchItem>, StorageError> {
        let found = self.store.query(&Filter::by_doi(&item.doi)).await?;
        if found.len() > 1 {
            tracing::warn!(
                "{} documents share DOI {}, merging into the first",
                found.len(),
                item.doi
            );
        }
        Ok(found.into_iter().next())
    }

    async fn write(
        &self,
        mut item: ResearchItem,
        existing: Option<ResearchItem>,
    ) -> Result<PersistOutcome, StorageError> {
        let Some(existing) = existing else {
            self.store.insert(&item).await?;
            return Ok(PersistOutcome::Inserted);
        };

        if compare_versions(existing.version, item.version) >= 0 {
            return Ok(PersistOutcome::Discarded);
        }

        item.adopt_identity(&existing);
        if item.has_revision() {
            self.store.update(&item).await?;
            Ok(PersistOutcome::Updated)
        } else {
            self.store.insert(&item).await?;
            Ok(PersistOutcome::Inserted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::queue::{HandoffQueue, QueueSender};
    use crate::models::ResearchItemBuilder;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn item(doi: &str, version: Option<u32>, title: &str) -> ResearchItem {
        let builder = ResearchItemBuilder::new(doi, title)
            .authors(["Ada Lovelace"])
            .category("genomics");
        match version {
            Some(v) => builder.version(v).build(),
            None => builder.build(),
        }
    }

    fn consumer(store: Arc<MemoryStore>) -> (CrawlConsumer, QueueSender) {
        let (tx, rx) = HandoffQueue::bounded(16).unwrap();
        (CrawlConsumer::new(store, rx), tx)
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions(Some(3), Some(1)), 2);
        assert_eq!(compare_versions(Some(2), Some(2)), 0);
        assert_eq!(compare_versions(Some(1), Some(4)), -3);
        assert_eq!(compare_versions(None, Some(1)), -1);
        assert_eq!(compare_versions(Some(5), None), -1);
        assert_eq!(compare_versions(None, None), -1);
    }

    #[tokio::test]
    async fn test_fresh_doi_is_inserted() {
        let store = Arc::new(MemoryStore::new());
        let (consumer, _tx) = consumer(store.clone());

        let outcome = consumer.persist(item("10.1/a", Some(1), "A")).await.unwrap();

        assert_eq!(outcome, PersistOutcome::Inserted);
        assert_eq!(store.insert_count(), 1);
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_version_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let (consumer, _tx) = consumer(store.clone());

        consumer.persist(item("10.1/a", Some(2), "Second")).await.unwrap();
        let stale = consumer.persist(item("10.1/a", Some(1), "First")).await.unwrap();
        let same = consumer.persist(item("10.1/a", Some(2), "Again")).await.unwrap();

        assert_eq!(stale, PersistOutcome::Discarded);
        assert_eq!(same, PersistOutcome::Discarded);
        let stored = store.find_by_doi("10.1/a");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Second");
        assert_eq!(store.insert_count() + store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_newer_version_keeps_identity_and_votes() {
        let store = Arc::new(MemoryStore::new());
        let created = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let original = ResearchItemBuilder::new("10.1/a", "Old title")
            .authors(["Ada Lovelace"])
            .category("genomics")
            .version(1)
            .create_date(created)
            .votes(7, 2)
            .build();
        store.insert(&original).await.unwrap();
        let before = store.find_by_doi("10.1/a").remove(0);

        let (consumer, _tx) = consumer(store.clone());
        let newer = ResearchItemBuilder::new("10.1/a", "New title")
            .authors(["Charles Babbage"])
            .category("bioinformatics")
            .version(3)
            .create_date(Utc::now())
            .build();
        let outcome = consumer.persist(newer).await.unwrap();

        assert_eq!(outcome, PersistOutcome::Updated);
        let stored = store.find_by_doi("10.1/a");
        assert_eq!(stored.len(), 1);
        let after = &stored[0];
        assert_eq!(after.id, before.id);
        assert_ne!(after.revision, before.revision);
        assert_eq!(after.create_date, Some(created));
        assert_eq!(after.yes_votes, Some(7));
        assert_eq!(after.no_votes, Some(2));
        assert_eq!(after.title, "New title");
        assert_eq!(after.authors, vec!["Charles Babbage"]);
        assert_eq!(after.category, "bioinformatics");
        assert_eq!(after.version, Some(3));
    }

    #[tokio::test]
    async fn test_unversioned_document_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        let (consumer, _tx) = consumer(store.clone());

        consumer.persist(item("10.1/a", None, "Legacy")).await.unwrap();
        let outcome = consumer.persist(item("10.1/a", Some(1), "Current")).await.unwrap();

        assert_eq!(outcome, PersistOutcome::Updated);
        assert_eq!(store.find_by_doi("10.1/a")[0].title, "Current");
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_the_loop() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes_for("10.1/bad");
        let (consumer, tx) = consumer(store.clone());
        let cancel = CancellationToken::new();

        for doi in ["10.1/a", "10.1/bad", "10.1/b"] {
            tx.put(item(doi, Some(1), doi), &cancel).await.unwrap();
        }
        drop(tx);

        let stats = consumer.run(cancel).await;

        assert_eq!(
            stats,
            ConsumerStats { inserted: 2, updated: 0, discarded: 0, failed: 1 }
        );
        assert_eq!(store.documents().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_while_idle() {
        let store = Arc::new(MemoryStore::new());
        let (consumer, _tx) = consumer(store.clone());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(consumer.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats.total(), 0);
        assert_eq!(store.query_count(), 0);
        assert_eq!(store.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_lookup_writes_nothing() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_secs(30)));
        let (consumer, tx) = consumer(store.clone());
        let cancel = CancellationToken::new();

        tx.put(item("10.1/a", Some(1), "A"), &cancel).await.unwrap();
        let task = tokio::spawn(consumer.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.total(), 0);
        assert!(store.documents().is_empty());
    }
}
