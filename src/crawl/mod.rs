//! The crawl-and-persist pipeline.
//!
//! A [`CrawlProducer`] walks the pages of one external resource and places
//! every extracted item on a bounded [`HandoffQueue`]. A single long-lived
//! [`CrawlConsumer`] takes items off the queue and writes them to a
//! [`DocumentStore`](crate::storage::DocumentStore), deduplicating by DOI.
//! [`CrawlSession`] ties the two together: it owns the queue, starts the
//! consumer once, and launches one producer task per requested run.
//!
//! Cancellation is cooperative. Every wait (fetch, politeness delay, full
//! queue, empty queue, storage query) is raced against a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

mod consumer;
mod producer;
mod queue;
mod session;

pub use consumer::{compare_versions, ConsumerStats, CrawlConsumer, PersistOutcome};
pub use producer::{CrawlProducer, EmptyPagePolicy, ProducerOptions, RunReport};
pub use queue::{HandoffQueue, QueueError, QueueReceiver, QueueSender, DEFAULT_QUEUE_CAPACITY};
pub use session::{CrawlSession, CrawlSettings, RunHandle, RunStatus};

use crate::adapters::AdapterError;
use crate::utils::FetchError;

/// Errors that end a crawl run
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// No adapter is registered for the locator's host
    #[error("No adapter registered for host '{0}'")]
    NoAdapter(String),

    /// A page could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A fetched page could not be read by the adapter
    #[error("Could not read '{locator}': {source}")]
    Response {
        locator: String,
        #[source]
        source: AdapterError,
    },

    /// The consumer side of the queue is gone
    #[error("Hand-off queue is closed")]
    QueueClosed,
}
