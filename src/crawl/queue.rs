//! Bounded hand-off queue between producers and the consumer.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::ResearchItem;

/// Capacity used when none is configured
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Errors raised by queue operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue capacity must be greater than zero")]
    InvalidCapacity,

    #[error("Cancelled while waiting for queue space")]
    Cancelled,

    #[error("Queue is closed")]
    Closed,
}

/// Bounded FIFO channel of research items.
///
/// `put` waits while the queue is full, throttling the producer instead of
/// buffering without limit; `take` waits while it is empty. Both waits end
/// early when the supplied cancellation token fires.
#[derive(Debug)]
pub struct HandoffQueue;

impl HandoffQueue {
    /// Create a queue holding at most `capacity` items
    pub fn bounded(capacity: usize) -> Result<(QueueSender, QueueReceiver), QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok((QueueSender { tx }, QueueReceiver { rx }))
    }
}

/// Sending half; cloned once per producer run
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<ResearchItem>,
}

impl QueueSender {
    /// Enqueue an item, waiting for space.
    ///
    /// On cancellation the item is dropped and nothing already queued is
    /// touched.
    pub async fn put(&self, item: ResearchItem, cancel: &CancellationToken) -> Result<(), QueueError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueueError::Cancelled),
            sent = self.tx.send(item) => sent.map_err(|_| QueueError::Closed),
        }
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, owned by the consumer
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<ResearchItem>,
}

impl QueueReceiver {
    /// Dequeue the next item, waiting while the queue is empty.
    ///
    /// Returns `None` once cancelled, or when every sender is gone and the
    /// queue is drained.
    pub async fn take(&mut self, cancel: &CancellationToken) -> Option<ResearchItem> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Dequeue without waiting
    pub fn try_take(&mut self) -> Option<ResearchItem> {
        self.rx.try_recv().ok()
    }

    /// Items currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
