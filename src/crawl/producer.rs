//! Paced producer walking the pages of one external resource.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::queue::{QueueError, QueueSender};
use super::CrawlError;
use crate::adapters::AdapterRegistry;
use crate::models::CrawlLocator;
use crate::utils::Fetcher;

/// What to do after a page that yields no items.
///
/// A page is empty when the adapter extracts nothing from it, so a page whose
/// records were all skipped as malformed counts as empty. Items the producer
/// itself drops for missing fields do not make a page empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyPagePolicy {
    /// End the run successfully
    #[default]
    Stop,
    /// Fetch one more page; a second empty page in a row ends the run
    FetchNext,
}

/// Tunables of a single run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerOptions {
    #[serde(default)]
    pub empty_page_policy: EmptyPagePolicy,

    /// Upper bound on the number of pages fetched
    #[serde(default)]
    pub max_pages: Option<u32>,
}

/// Outcome of a run that did not fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Items placed on the queue
    pub items: usize,
    /// Pages fetched successfully
    pub pages: usize,
    /// Whether the run stopped because it was cancelled
    pub cancelled: bool,
}

impl RunReport {
    fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }
}

/// Drives the fetch, extract, enqueue, paginate and delay loop for one run.
///
/// The adapter is chosen once from the starting locator's host. Before every
/// fetch but the first the producer sleeps for the adapter's crawl delay.
/// Fetching, sleeping and waiting for queue space all give way to the
/// cancellation token; items already queued stay queued.
#[derive(Debug, Clone)]
pub struct CrawlProducer {
    registry: Arc<AdapterRegistry>,
    fetcher: Arc<dyn Fetcher>,
    queue: QueueSender,
    options: ProducerOptions,
}

impl CrawlProducer {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        fetcher: Arc<dyn Fetcher>,
        queue: QueueSender,
        options: ProducerOptions,
    ) -> Self {
        Self {
            registry,
            fetcher,
            queue,
            options,
        }
    }

    /// Crawl from `start` until pagination ends, an error occurs or `cancel` fires.
    pub async fn run(
        &self,
        start: CrawlLocator,
        cancel: &CancellationToken,
    ) -> Result<RunReport, CrawlError> {
        let adapter = Arc::clone(self.registry.for_locator(&start)?);
        tracing::info!("Starting crawl of {} with {}", start, adapter.name());

        let mut report = RunReport::default();
        let mut current = start;
        let mut previous_empty = false;

        loop {
            if let Some(max) = self.options.max_pages {
                if report.pages >= max as usize {
                    tracing::info!("Reached page limit of {}", max);
                    break;
                }
            }

            if report.pages > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(report.cancelled()),
                    _ = tokio::time::sleep(adapter.crawl_delay()) => {}
                }
            }

            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(report.cancelled()),
                fetched = self.fetcher.get(&current) => fetched?,
            };
            report.pages += 1;

            let items = adapter
                .extract_items(&body)
                .map_err(|source| CrawlError::Response {
                    locator: current.to_string(),
                    source,
                })?;
            let found = items.len();
            tracing::debug!("Page {} ({}) yielded {} items", report.pages, current, found);

            for item in items {
                if !item.meets_minimum_criteria() {
                    tracing::warn!("Dropping incomplete item {} from {}", item, current);
                    continue;
                }
                match self.queue.put(item, cancel).await {
                    Ok(()) => report.items += 1,
                    Err(QueueError::Cancelled) => return Ok(report.cancelled()),
                    Err(_) => return Err(CrawlError::QueueClosed),
                }
            }

            let empty = found == 0;
            if empty {
                match self.options.empty_page_policy {
                    EmptyPagePolicy::Stop => {
                        tracing::debug!("Empty page at {}, stopping", current);
                        break;
                    }
                    EmptyPagePolicy::FetchNext if previous_empty => {
                        tracing::debug!("Second empty page in a row at {}, stopping", current);
                        break;
                    }
                    EmptyPagePolicy::FetchNext => {}
                }
            }
            previous_empty = empty;

            match adapter.next_locator(&current) {
                Some(next) => current = next,
                None => break,
            }
        }

        tracing::info!(
            "Crawl finished: {} items from {} pages",
            report.items,
            report.pages
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{page_body, page_url, record};
    use crate::adapters::MockAdapter;
    use crate::crawl::queue::{HandoffQueue, QueueReceiver};
    use crate::utils::{FetchError, MockFetcher};
    use std::time::Duration;

    fn registry(adapter: MockAdapter) -> Arc<AdapterRegistry> {
        let mut registry = AdapterRegistry::empty();
        registry.register(Arc::new(adapter));
        Arc::new(registry)
    }

    fn producer(
        adapter: MockAdapter,
        fetcher: Arc<MockFetcher>,
        capacity: usize,
        options: ProducerOptions,
    ) -> (CrawlProducer, QueueReceiver) {
        let (tx, rx) = HandoffQueue::bounded(capacity).unwrap();
        (CrawlProducer::new(registry(adapter), fetcher, tx, options), rx)
    }

    fn start() -> CrawlLocator {
        CrawlLocator::parse(&page_url(1)).unwrap()
    }

    fn drain(rx: &mut QueueReceiver) -> Vec<String> {
        std::iter::from_fn(|| rx.try_take()).map(|i| i.doi).collect()
    }

    #[tokio::test]
    async fn test_walks_every_page_once() {
        let fetcher = Arc::new(MockFetcher::new());
        for page in 1..=3 {
            let doi = format!("10.1/p{}", page);
            fetcher.set_body(page_url(page), page_body(&[record(&doi, Some(1))]));
        }

        let (producer, mut rx) =
            producer(MockAdapter::new(3), fetcher.clone(), 10, ProducerOptions::default());
        let report = producer.run(start(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report, RunReport { items: 3, pages: 3, cancelled: false });
        assert_eq!(
            fetcher.requests(),
            vec![page_url(1), page_url(2), page_url(3)]
        );
        assert_eq!(drain(&mut rx), vec!["10.1/p1", "10.1/p2", "10.1/p3"]);
    }

    #[tokio::test]
    async fn test_counts_only_complete_items() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut untitled = record("10.1/untitled", Some(1));
        untitled["title"] = serde_json::json!("  ");
        let mut uncategorised = record("10.1/nocat", Some(1));
        uncategorised["category"] = serde_json::json!("");
        fetcher.set_body(
            page_url(1),
            page_body(&[record("10.1/a", Some(1)), untitled, uncategorised]),
        );
        fetcher.set_body(page_url(2), page_body(&[record("10.1/b", None)]));

        let (producer, mut rx) =
            producer(MockAdapter::new(2), fetcher, 10, ProducerOptions::default());
        let report = producer.run(start(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report.items, 2);
        assert_eq!(drain(&mut rx), vec!["10.1/a", "10.1/b"]);
    }

    #[tokio::test]
    async fn test_unknown_host_fails() {
        let fetcher = Arc::new(MockFetcher::new());
        let (producer, _rx) =
            producer(MockAdapter::new(1), fetcher.clone(), 1, ProducerOptions::default());

        let locator = CrawlLocator::parse("https://api.biorxiv.org/details/biorxiv/7d/0").unwrap();
        let result = producer.run(locator, &CancellationToken::new()).await;

        assert!(matches!(result, Err(CrawlError::NoAdapter(host)) if host == "api.biorxiv.org"));
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_earlier_items() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_body(page_url(1), page_body(&[record("10.1/a", Some(1))]));
        fetcher.set_status(page_url(2), 503);

        let (producer, mut rx) =
            producer(MockAdapter::new(5), fetcher.clone(), 10, ProducerOptions::default());
        let result = producer.run(start(), &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(CrawlError::Fetch(FetchError::Status { status: 503, .. }))
        ));
        assert_eq!(fetcher.request_count(), 2);
        assert_eq!(drain(&mut rx), vec!["10.1/a"]);
    }

    #[tokio::test]
    async fn test_unreadable_body_fails() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_body(page_url(1), "<html>not json</html>");

        let (producer, _rx) =
            producer(MockAdapter::new(1), fetcher, 1, ProducerOptions::default());
        let result = producer.run(start(), &CancellationToken::new()).await;

        assert!(matches!(result, Err(CrawlError::Response { .. })));
    }

    #[tokio::test]
    async fn test_empty_page_stops_by_default() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_body(page_url(1), page_body(&[]));
        fetcher.set_body(page_url(2), page_body(&[record("10.1/a", Some(1))]));

        let (producer, _rx) =
            producer(MockAdapter::new(5), fetcher.clone(), 10, ProducerOptions::default());
        let report = producer.run(start(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report, RunReport { items: 0, pages: 1, cancelled: false });
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_page_fetches_next() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_body(page_url(1), page_body(&[]));
        fetcher.set_body(page_url(2), page_body(&[record("10.1/a", Some(1))]));
        fetcher.set_body(page_url(3), page_body(&[]));
        fetcher.set_body(page_url(4), page_body(&[]));
        fetcher.set_body(page_url(5), page_body(&[record("10.1/b", Some(1))]));

        let options = ProducerOptions {
            empty_page_policy: EmptyPagePolicy::FetchNext,
            max_pages: None,
        };
        let (producer, _rx) = producer(MockAdapter::new(5), fetcher.clone(), 10, options);
        let report = producer.run(start(), &CancellationToken::new()).await.unwrap();

        // Pages 3 and 4 are both empty, so page 5 is never requested.
        assert_eq!(report, RunReport { items: 1, pages: 4, cancelled: false });
        assert_eq!(fetcher.request_count(), 4);
    }

    #[tokio::test]
    async fn test_max_pages() {
        let fetcher = Arc::new(MockFetcher::new());
        for page in 1..=4 {
            fetcher.set_body(page_url(page), page_body(&[record(&format!("10.1/{}", page), None)]));
        }

        let options = ProducerOptions {
            max_pages: Some(2),
            ..Default::default()
        };
        let (producer, _rx) = producer(MockAdapter::new(4), fetcher.clone(), 10, options);
        let report = producer.run(start(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_zero_page_limit_fetches_nothing() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_body(page_url(1), page_body(&[record("10.1/a", None)]));

        let options = ProducerOptions {
            max_pages: Some(0),
            ..Default::default()
        };
        let (producer, mut rx) = producer(MockAdapter::new(1), fetcher.clone(), 10, options);
        let report = producer.run(start(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report, RunReport::default());
        assert_eq!(fetcher.request_count(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_page_of_skipped_records_counts_as_empty() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_body(
            page_url(1),
            page_body(&[serde_json::json!({"title": "no doi"}), serde_json::json!(42)]),
        );
        fetcher.set_body(page_url(2), page_body(&[record("10.1/a", Some(1))]));

        let (producer, _rx) =
            producer(MockAdapter::new(2), fetcher.clone(), 10, ProducerOptions::default());
        let report = producer.run(start(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report, RunReport { items: 0, pages: 1, cancelled: false });
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn test_page_of_incomplete_items_is_not_empty() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut untitled = record("10.1/untitled", Some(1));
        untitled["title"] = serde_json::json!("");
        fetcher.set_body(page_url(1), page_body(&[untitled]));
        fetcher.set_body(page_url(2), page_body(&[record("10.1/a", Some(1))]));

        let (producer, _rx) =
            producer(MockAdapter::new(2), fetcher.clone(), 10, ProducerOptions::default());
        let report = producer.run(start(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report, RunReport { items: 1, pages: 2, cancelled: false });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fetch() {
        let fetcher = Arc::new(MockFetcher::new().with_latency(Duration::from_secs(60)));
        fetcher.set_body(page_url(1), page_body(&[record("10.1/a", Some(1))]));

        let (producer, mut rx) =
            producer(MockAdapter::new(1), fetcher.clone(), 10, ProducerOptions::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let began = tokio::time::Instant::now();
        let report = producer.run(start(), &cancel).await.unwrap();

        assert!(began.elapsed() < Duration::from_secs(60));
        assert_eq!(report, RunReport { items: 0, pages: 0, cancelled: true });
        assert_eq!(fetcher.request_count(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_fetches() {
        let fetcher = Arc::new(MockFetcher::new());
        for page in 1..=3 {
            fetcher.set_body(page_url(page), page_body(&[record(&format!("10.1/{}", page), None)]));
        }

        let (producer, _rx) = producer(
            MockAdapter::new(3).with_delay_seconds(7),
            fetcher,
            10,
            ProducerOptions::default(),
        );
        let began = tokio::time::Instant::now();
        producer.run(start(), &CancellationToken::new()).await.unwrap();

        let elapsed = began.elapsed();
        assert!(elapsed >= Duration::from_secs(14), "slept {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(21), "slept {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_body(page_url(1), page_body(&[record("10.1/a", Some(1))]));
        fetcher.set_body(page_url(2), page_body(&[record("10.1/b", Some(1))]));

        let (producer, mut rx) = producer(
            MockAdapter::new(2).with_delay_seconds(60),
            fetcher.clone(),
            10,
            ProducerOptions::default(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let began = tokio::time::Instant::now();
        let report = producer.run(start(), &cancel).await.unwrap();

        assert!(began.elapsed() < Duration::from_secs(60));
        assert_eq!(report, RunReport { items: 1, pages: 1, cancelled: true });
        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(drain(&mut rx), vec!["10.1/a"]);
    }

    #[tokio::test]
    async fn test_cancel_while_queue_full() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_body(
            page_url(1),
            page_body(&[
                record("10.1/a", Some(1)),
                record("10.1/b", Some(1)),
                record("10.1/c", Some(1)),
            ]),
        );

        let (producer, mut rx) =
            producer(MockAdapter::new(1), fetcher, 2, ProducerOptions::default());
        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { producer.run(start(), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        cancel.cancel();

        let report = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.items, 2);
        assert_eq!(drain(&mut rx), vec!["10.1/a", "10.1/b"]);
    }
}
