use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};

/// A registered sink plus the handle to drop it again.
pub struct Subscription<T> {
    pub id: u64,
    pub rx: mpsc::Receiver<T>,
}

/// Fan-out bus for tracked-transaction results.
///
/// Every subscriber gets its own bounded inbox; `dispatch` awaits each send,
/// so a slow subscriber applies backpressure to the tracker instead of
/// losing terminal-state notifications. The registry is a linear scan, which
/// is fine for the handful of sinks wired at startup.
pub struct EventDispatcher<T> {
    subscribers: Mutex<Vec<(u64, mpsc::Sender<T>)>>,
    next_id: AtomicU64,
}

impl<T: Clone + Send + 'static> EventDispatcher<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub async fn subscribe(&self, capacity: usize) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().await.push((id, tx));
        Subscription { id, rx }
    }

    pub async fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|(sub_id, _)| *sub_id != id);
    }

    pub async fn dispatch(&self, event: T) {
        // Snapshot the registry so a send blocked on a slow subscriber does
        // not hold the lock against subscribe/unsubscribe.
        let subscribers: Vec<(u64, mpsc::Sender<T>)> = self.subscribers.lock().await.clone();
        for (id, tx) in &subscribers {
            if tx.send(event.clone()).await.is_err() {
                tracing::warn!(subscriber_id = *id, "Subscriber receiver dropped, event lost");
            }
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

impl<T: Clone + Send + 'static> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}
