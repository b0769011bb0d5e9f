pub mod error;
pub mod memory;

pub use memory::MemoryQueue;

use std::time::Duration;

use error::QueueError;

/// A message handed out under a lease. The message stays invisible to other
/// consumers until the lease expires or it is deleted.
#[derive(Debug, Clone)]
pub struct Delivery<T> {
    /// Handle used to acknowledge (delete) the message.
    pub receipt_id: String,
    pub body: T,
}

/// At-least-once delivery queue contract.
///
/// Consumers must call `delete` after fully processing a message; a message
/// whose lease lapses without deletion becomes visible again and will be
/// redelivered with the same receipt id. Deduplication is the consumer's
/// responsibility.
pub trait DurableQueue<T>: Send + Sync + 'static {
    /// Enqueue a message, returning its id.
    fn push(&self, body: T) -> impl Future<Output = Result<String, QueueError>> + Send;

    /// Lease a single message if one is immediately available.
    fn receive(
        &self,
        lease: Duration,
    ) -> impl Future<Output = Result<Option<Delivery<T>>, QueueError>> + Send;

    /// Lease up to `max` messages, waiting at most `wait` for the first one.
    fn receive_many(
        &self,
        max: usize,
        wait: Duration,
        lease: Duration,
    ) -> impl Future<Output = Result<Vec<Delivery<T>>, QueueError>> + Send;

    /// Acknowledge a message. Returns false if the receipt is unknown
    /// (already deleted, or its lease expired and it was redelivered).
    fn delete(&self, receipt_id: &str) -> impl Future<Output = Result<bool, QueueError>> + Send;

    /// Number of messages not yet acknowledged (ready + leased).
    fn len(&self) -> impl Future<Output = Result<usize, QueueError>> + Send;
}
