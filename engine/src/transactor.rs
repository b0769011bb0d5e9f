use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use relay_core::{chain::ChainClient, signer::TransactionSigner, transaction::TxRequest};
use relay_queue::{DurableQueue, error::QueueError};
use serde::Serialize;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};

use crate::{
    collector::BatchCollector,
    config::EngineConfig,
    dispatcher::{EventDispatcher, Subscription},
    factory::TransactionFactory,
    nonce::NonceManager,
    retry::{ExponentialBackoff, RetryPolicy, RetryTracker},
    sender::{ReplacementPolicy, Sender},
    state::{MessageStates, PreconfirmedState},
    tracker::{InFlightTx, Status, Tracker, TrackerConfig},
};

/// Point-in-time engine counters for logging and health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TransactorStats {
    pub acquired: usize,
    pub in_flight: usize,
    pub queue_depth: usize,
    pub dead_letters: u64,
}

/// Owns the whole submission pipeline for one sender account: queue intake,
/// batching, nonce assignment, broadcast, tracking and result fan-out.
///
/// Wiring is two-phase: the dispatcher exists before the collector or any
/// tracking starts, so the internal completion and replacement subscribers
/// are registered before the first event can fire.
pub struct Transactor<C, S, Q> {
    queue: Arc<Q>,
    nonces: Arc<NonceManager<C>>,
    sender: Arc<Sender<C, S>>,
    dispatcher: Arc<EventDispatcher<InFlightTx>>,
    states: Arc<MessageStates>,
    dead_letters: Arc<AtomicU64>,
    config: EngineConfig,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<C, S, Q> Transactor<C, S, Q>
where
    C: ChainClient + 'static,
    S: TransactionSigner + 'static,
    Q: DurableQueue<TxRequest> + 'static,
{
    pub async fn start(
        config: EngineConfig,
        chain: Arc<C>,
        signer: Arc<S>,
        queue: Arc<Q>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let nonces = Arc::new(NonceManager::new(chain.clone(), signer.address()));
        let retries = Arc::new(RetryTracker::new(RetryPolicy::Exponential(
            ExponentialBackoff::sender_defaults(),
        )));
        let dispatcher = Arc::new(EventDispatcher::new());
        let states = Arc::new(MessageStates::new());
        let dead_letters = Arc::new(AtomicU64::new(0));
        let fire_gate = Arc::new(Mutex::new(()));

        let factory = Arc::new(TransactionFactory::new(
            chain.clone(),
            signer.clone(),
            nonces.clone(),
            config.aggregator_address,
        ));
        let sender = Arc::new(Sender::new(
            chain.clone(),
            signer.clone(),
            nonces.clone(),
            retries,
            ReplacementPolicy::default(),
        ));
        let tracker = Tracker::new(
            chain.clone(),
            nonces.clone(),
            dispatcher.clone(),
            TrackerConfig {
                poll_interval: config.poll_interval(),
                mempool_timeout: config.mempool_timeout(),
                receipt_timeout: config.receipt_timeout(),
            },
            shutdown_rx.clone(),
        );

        let mut tasks = Vec::new();

        // Completion subscriber: acks queue receipts for mined successes and
        // drops preconfirmed state for every terminal result.
        let completion_sub = dispatcher.subscribe(config.dispatcher_buffer).await;
        tasks.push(tokio::spawn(completion_loop(
            completion_sub,
            queue.clone(),
            states.clone(),
            shutdown_rx.clone(),
        )));

        // Replacement subscriber: resubmits stale and errored transactions
        // with bumped fees.
        let replacement_sub = dispatcher.subscribe(config.dispatcher_buffer).await;
        tasks.push(tokio::spawn(replacement_loop(
            replacement_sub,
            sender.clone(),
            tracker.clone(),
            fire_gate.clone(),
            shutdown_rx.clone(),
        )));

        let collector = BatchCollector {
            queue: queue.clone(),
            factory,
            sender: sender.clone(),
            tracker,
            nonces: nonces.clone(),
            dispatcher: dispatcher.clone(),
            states: states.clone(),
            dead_letters: dead_letters.clone(),
            fire_gate,
            config: config.clone(),
            shutdown: shutdown_rx,
        };
        tasks.push(tokio::spawn(collector.run()));

        tracing::info!(sender = %signer.address(), "Transactor started");

        Self {
            queue,
            nonces,
            sender,
            dispatcher,
            states,
            dead_letters,
            config,
            shutdown_tx,
            tasks,
        }
    }

    /// Enqueue a request for submission and return its message id. The
    /// request is durable from this point on; terminal results arrive via
    /// [`Self::subscribe_tx_results`].
    pub async fn send_tx_request(&self, request: TxRequest) -> Result<String, QueueError> {
        let message_id = request.message_id.clone();
        self.states.set(&message_id, PreconfirmedState::Queued);
        if let Err(err) = self.queue.push(request).await {
            self.states.remove(&message_id);
            return Err(err);
        }
        tracing::debug!(message_id = %message_id, "Request queued");
        Ok(message_id)
    }

    /// Subscribe to terminal transaction results. Each subscriber sees every
    /// event; a slow subscriber backpressures the pipeline rather than
    /// missing results.
    pub async fn subscribe_tx_results(&self) -> Subscription<InFlightTx> {
        self.dispatcher.subscribe(self.config.dispatcher_buffer).await
    }

    /// Where a message currently sits in the pipeline, before its
    /// transaction confirms.
    pub fn preconfirmed_state(&self, message_id: &str) -> PreconfirmedState {
        self.states.get(message_id)
    }

    pub async fn stats(&self) -> TransactorStats {
        let nonce_stats = self.nonces.stats().await;
        let queue_depth = match self.queue.len().await {
            Ok(depth) => depth,
            Err(err) => {
                tracing::warn!(error = %err, "Queue depth unavailable");
                0
            }
        };
        TransactorStats {
            acquired: nonce_stats.acquired,
            in_flight: nonce_stats.in_flight,
            queue_depth,
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
        }
    }

    /// Signal every pipeline task to stop and wait for them to drain.
    /// In-flight tracking is abandoned; unacked queue messages reappear
    /// after their lease lapses.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "Pipeline task panicked during shutdown");
            }
        }
        tracing::info!("Transactor stopped");
    }
}

async fn completion_loop<Q>(
    mut sub: Subscription<InFlightTx>,
    queue: Arc<Q>,
    states: Arc<MessageStates>,
    mut shutdown: watch::Receiver<bool>,
) where
    Q: DurableQueue<TxRequest>,
{
    loop {
        tokio::select! {
            event = sub.rx.recv() => {
                let Some(event) = event else { break };
                let status = event.status();
                match status {
                    Status::Success => {
                        for m in &event.messages {
                            match queue.delete(&m.receipt_id).await {
                                Ok(true) => {}
                                Ok(false) => tracing::debug!(
                                    receipt_id = %m.receipt_id,
                                    "Receipt already gone on ack"
                                ),
                                Err(err) => tracing::warn!(
                                    receipt_id = %m.receipt_id,
                                    error = %err,
                                    "Failed to ack queue message"
                                ),
                            }
                            states.remove(&m.message_id);
                        }
                        tracing::info!(
                            hash = %event.hash,
                            messages = event.messages.len(),
                            "Confirmed and acked"
                        );
                    }
                    Status::Reverted | Status::Error => {
                        // Deliberately not acked: the lease lapses and the
                        // messages come back around.
                        for m in &event.messages {
                            states.remove(&m.message_id);
                        }
                        tracing::warn!(
                            hash = %event.hash,
                            status = %status,
                            "Terminal without ack, messages will be redriven"
                        );
                    }
                    Status::Stale | Status::Pending => {}
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn replacement_loop<C, S>(
    mut sub: Subscription<InFlightTx>,
    sender: Arc<Sender<C, S>>,
    tracker: Tracker<C>,
    fire_gate: Arc<Mutex<()>>,
    mut shutdown: watch::Receiver<bool>,
) where
    C: ChainClient,
    S: TransactionSigner,
{
    loop {
        tokio::select! {
            event = sub.rx.recv() => {
                let Some(event) = event else { break };
                if !matches!(event.status(), Status::Stale | Status::Error) {
                    continue;
                }

                // Hold the fire gate so the replacement cannot interleave
                // with a batch mid-build and reorder nonce assignment.
                let _gate = fire_gate.lock().await;
                match sender.resubmit_replacement(&event).await {
                    Ok(built) => {
                        let hash = built.hash;
                        let replacement = InFlightTx::new(built, event.messages.clone());
                        match tracker.track(replacement).await {
                            Ok(()) => tracing::info!(
                                old_hash = %event.hash,
                                new_hash = %hash,
                                "Replacement submitted"
                            ),
                            Err(err) => tracing::error!(
                                hash = %hash,
                                error = %err,
                                "Failed to track replacement"
                            ),
                        }
                    }
                    // Swallowed on purpose: a failed replacement must not
                    // take down the fan-out, the queue lease recovers the
                    // messages.
                    Err(err) => tracing::warn!(
                        hash = %event.hash,
                        error = %err,
                        "Replacement resubmission failed"
                    ),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
