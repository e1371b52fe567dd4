//! Control surface: one consumer per session, one producer per run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::consumer::{ConsumerStats, CrawlConsumer};
use super::producer::{CrawlProducer, ProducerOptions};
use super::queue::{HandoffQueue, QueueError, QueueSender, DEFAULT_QUEUE_CAPACITY};
use crate::adapters::AdapterRegistry;
use crate::models::CrawlLocator;
use crate::storage::DocumentStore;
use crate::utils::Fetcher;

/// Settings shared by every run of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSettings {
    pub queue_capacity: usize,
    pub producer: ProducerOptions,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            producer: ProducerOptions::default(),
        }
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Started,
    Succeeded { items: usize },
    Failed(String),
    Cancelled { items: usize },
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, RunStatus::Started)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Started => write!(f, "started"),
            RunStatus::Succeeded { items } => write!(f, "succeeded with {} items", items),
            RunStatus::Failed(reason) => write!(f, "failed: {}", reason),
            RunStatus::Cancelled { items } => write!(f, "cancelled after {} items", items),
        }
    }
}

/// Handle on a run started with [`CrawlSession::start_run`]
#[derive(Debug)]
pub struct RunHandle {
    cancel: CancellationToken,
    status: watch::Receiver<RunStatus>,
    task: JoinHandle<()>,
}

impl RunHandle {
    /// Ask the producer to stop at its next suspension point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Current status of the run
    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end and return its final status
    pub async fn wait(self) -> RunStatus {
        if let Err(e) = self.task.await {
            return RunStatus::Failed(format!("run task aborted: {}", e));
        }
        let status = self.status.borrow().clone();
        status
    }
}

/// A crawl session.
///
/// Starting a session creates the hand-off queue and spawns its single
/// consumer, which keeps running across runs until cancelled. Each call to
/// [`start_run`](Self::start_run) spawns a producer feeding that same queue.
/// Must be created inside a Tokio runtime.
#[derive(Debug)]
pub struct CrawlSession {
    registry: Arc<AdapterRegistry>,
    fetcher: Arc<dyn Fetcher>,
    sender: QueueSender,
    producer_options: ProducerOptions,
    runs: CancellationToken,
    consumer_cancel: CancellationToken,
    consumer: JoinHandle<ConsumerStats>,
}

impl CrawlSession {
    pub fn start(
        registry: Arc<AdapterRegistry>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn DocumentStore>,
        settings: &CrawlSettings,
    ) -> Result<Self, QueueError> {
        let (sender, receiver) = HandoffQueue::bounded(settings.queue_capacity)?;
        let consumer_cancel = CancellationToken::new();
        let consumer = tokio::spawn(CrawlConsumer::new(store, receiver).run(consumer_cancel.clone()));
        tracing::debug!(
            "Session started with queue capacity {}",
            settings.queue_capacity
        );

        Ok(Self {
            registry,
            fetcher,
            sender,
            producer_options: settings.producer.clone(),
            runs: CancellationToken::new(),
            consumer_cancel,
            consumer,
        })
    }

    /// Start crawling from `locator` in the background.
    ///
    /// Returns immediately; an unknown host is reported through the handle
    /// as a failed run and leaves the session untouched.
    pub fn start_run(&self, locator: CrawlLocator) -> RunHandle {
        let cancel = self.runs.child_token();
        let (status_tx, status_rx) = watch::channel(RunStatus::Started);
        let producer = CrawlProducer::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.fetcher),
            self.sender.clone(),
            self.producer_options.clone(),
        );

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let status = match producer.run(locator.clone(), &token).await {
                Ok(report) if report.cancelled => {
                    tracing::info!("Crawl of {} cancelled", locator);
                    RunStatus::Cancelled { items: report.items }
                }
                Ok(report) => RunStatus::Succeeded { items: report.items },
                Err(e) => {
                    tracing::error!("Crawl of {} failed: {}", locator, e);
                    RunStatus::Failed(e.to_string())
                }
            };
            status_tx.send_replace(status);
        });

        RunHandle {
            cancel,
            status: status_rx,
            task,
        }
    }

    /// Items waiting on the queue
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.available()
    }

    pub fn is_consumer_running(&self) -> bool {
        !self.consumer.is_finished()
    }

    /// Stop the consumer; items still queued are left unprocessed
    pub fn cancel_consumer(&self) {
        self.consumer_cancel.cancel();
    }

    /// Token that stops the consumer when cancelled, usable after the session is consumed
    pub fn consumer_token(&self) -> CancellationToken {
        self.consumer_cancel.clone()
    }

    /// Cancel every run and the consumer, then return the consumer's totals
    pub async fn shutdown(self) -> ConsumerStats {
        self.runs.cancel();
        self.consumer_cancel.cancel();
        Self::join_consumer(self.consumer).await
    }

    /// Let the consumer work through everything queued, then stop it.
    ///
    /// Waits for runs still producing, since they keep the queue open.
    pub async fn drain(self) -> ConsumerStats {
        drop(self.sender);
        Self::join_consumer(self.consumer).await
    }

    async fn join_consumer(consumer: JoinHandle<ConsumerStats>) -> ConsumerStats {
        match consumer.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("Consumer task ended abnormally: {}", e);
                ConsumerStats::default()
            }
        }
    }
}
