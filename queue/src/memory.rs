use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use nanoid::nanoid;
use tokio::{sync::Notify, time::Instant};

use crate::{Delivery, DurableQueue, error::QueueError};

struct Leased<T> {
    body: T,
    deadline: Instant,
}

struct QueueState<T> {
    ready: VecDeque<(String, T)>,
    leased: HashMap<String, Leased<T>>,
}

impl<T> QueueState<T> {
    /// Move messages whose lease lapsed back to the front of the ready list.
    fn reclaim_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .leased
            .iter()
            .filter(|(_, leased)| leased.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(leased) = self.leased.remove(&id) {
                tracing::debug!(receipt_id = %id, "Lease expired, message requeued");
                self.ready.push_front((id, leased.body));
            }
        }
    }
}

/// In-process `DurableQueue` implementation.
///
/// Backs the engine in tests and single-process deployments; a network queue
/// service with visibility timeouts satisfies the same contract.
pub struct MemoryQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> MemoryQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                leased: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }
}

impl<T> Default for MemoryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn lease_batch(&self, max: usize, lease: Duration) -> Vec<Delivery<T>> {
        let mut state = self.state.lock().expect("queue state lock poisoned");
        state.reclaim_expired();

        let deadline = Instant::now() + lease;
        let mut batch = Vec::new();

        while batch.len() < max {
            let Some((id, body)) = state.ready.pop_front() else {
                break;
            };
            state.leased.insert(
                id.clone(),
                Leased {
                    body: body.clone(),
                    deadline,
                },
            );
            batch.push(Delivery {
                receipt_id: id,
                body,
            });
        }

        batch
    }
}

impl<T> DurableQueue<T> for MemoryQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn push(&self, body: T) -> Result<String, QueueError> {
        let id = nanoid!();
        {
            let mut state = self.state.lock().expect("queue state lock poisoned");
            state.ready.push_back((id.clone(), body));
        }
        self.notify.notify_one();
        Ok(id)
    }

    async fn receive(&self, lease: Duration) -> Result<Option<Delivery<T>>, QueueError> {
        Ok(self.lease_batch(1, lease).into_iter().next())
    }

    async fn receive_many(
        &self,
        max: usize,
        wait: Duration,
        lease: Duration,
    ) -> Result<Vec<Delivery<T>>, QueueError> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let deadline = Instant::now() + wait;
        loop {
            let batch = self.lease_batch(max, lease);
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            // A push between `lease_batch` and here leaves a stored permit on
            // the Notify, so the wakeup cannot be lost.
            let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
        }
    }

    async fn delete(&self, receipt_id: &str) -> Result<bool, QueueError> {
        let mut state = self.state.lock().expect("queue state lock poisoned");
        if state.leased.remove(receipt_id).is_some() {
            return Ok(true);
        }
        // The lease may have lapsed and put the message back on the ready
        // list; an ack must still win over redelivery.
        let before = state.ready.len();
        state.ready.retain(|(id, _)| id != receipt_id);
        Ok(state.ready.len() != before)
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let state = self.state.lock().expect("queue state lock poisoned");
        Ok(state.ready.len() + state.leased.len())
    }
}
