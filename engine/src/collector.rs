use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use relay_core::{chain::ChainClient, signer::TransactionSigner, transaction::TxRequest};
use relay_queue::{Delivery, DurableQueue};
use tokio::{
    sync::{Mutex, watch},
    time::Instant,
};

use crate::{
    config::EngineConfig,
    dispatcher::EventDispatcher,
    factory::TransactionFactory,
    nonce::NonceManager,
    sender::Sender,
    state::{MessageStates, PreconfirmedState},
    tracker::{InFlightTx, MessageRef, Tracker},
};

/// The scheduling heartbeat of the pipeline: pulls requests off the queue,
/// bounds them by size and time, and fires each batch through
/// factory -> sender -> tracker.
///
/// Build+send is serialized behind `fire_gate` so nonce acquisition order
/// matches batch arrival order; tracking afterwards is fully concurrent.
pub struct BatchCollector<C, S, Q> {
    pub queue: Arc<Q>,
    pub factory: Arc<TransactionFactory<C, S>>,
    pub sender: Arc<Sender<C, S>>,
    pub tracker: Tracker<C>,
    pub nonces: Arc<NonceManager<C>>,
    pub dispatcher: Arc<EventDispatcher<InFlightTx>>,
    pub states: Arc<MessageStates>,
    pub dead_letters: Arc<AtomicU64>,
    pub fire_gate: Arc<Mutex<()>>,
    pub config: EngineConfig,
    pub shutdown: watch::Receiver<bool>,
}

impl<C, S, Q> BatchCollector<C, S, Q>
where
    C: ChainClient,
    S: TransactionSigner,
    Q: DurableQueue<TxRequest>,
{
    pub async fn run(mut self) {
        tracing::info!(
            batch_size = self.config.tx_batch_size,
            batch_timeout_ms = self.config.tx_batch_timeout_ms,
            "Batch collector started"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let batch = self.collect_batch().await;
            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.empty_queue_delay()) => {}
                    _ = self.shutdown.changed() => {}
                }
                continue;
            }

            self.fire(batch).await;
        }

        tracing::info!("Batch collector stopped");
    }

    /// Pull up to `tx_batch_size` requests, waiting at most the batch
    /// window. With `wait_full_batch_timeout` set, a full batch still waits
    /// out the window before firing.
    async fn collect_batch(&mut self) -> Vec<Delivery<TxRequest>> {
        let deadline = Instant::now() + self.config.tx_batch_timeout();
        let mut batch: Vec<Delivery<TxRequest>> = Vec::new();

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let capacity = self.config.tx_batch_size - batch.len();
            if capacity == 0 {
                if self.config.wait_full_batch_timeout {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
                break;
            }

            match self
                .queue
                .receive_many(capacity, deadline - now, self.config.queue_lease())
                .await
            {
                Ok(deliveries) => batch.extend(deliveries),
                Err(err) => {
                    tracing::warn!(error = %err, "Queue receive failed");
                    break;
                }
            }
        }

        batch
    }

    async fn fire(&self, batch: Vec<Delivery<TxRequest>>) {
        let requests: Vec<TxRequest> = batch.iter().map(|d| d.body.clone()).collect();
        let messages: Vec<MessageRef> = batch
            .iter()
            .map(|d| MessageRef {
                receipt_id: d.receipt_id.clone(),
                message_id: d.body.message_id.clone(),
            })
            .collect();

        // The gate covers build and send only. Dispatching below it would
        // wait on the replacement subscriber, which itself waits on the gate
        // before resubmitting.
        let gate = self.fire_gate.lock().await;

        self.states.set_all(
            messages.iter().map(|m| m.message_id.as_str()),
            PreconfirmedState::Building,
        );

        let mut built = match self.factory.build_transaction_from_requests(&requests).await {
            Ok(built) => built,
            Err(failure) => {
                if let Some(nonce) = failure.acquired_nonce {
                    self.nonces.release_acquired(nonce).await;
                }
                self.dead_letters
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                tracing::error!(
                    error = %failure.error,
                    messages = batch.len(),
                    "Build failed, dropping batch; queue redrive recovers the messages"
                );
                for m in &messages {
                    self.states.remove(&m.message_id);
                }
                return;
            }
        };

        self.states.set_all(
            messages.iter().map(|m| m.message_id.as_str()),
            PreconfirmedState::Sending,
        );

        let sent = self.sender.send_transaction(&mut built).await;
        drop(gate);

        match sent {
            Ok(()) => {
                self.states.set_all(
                    messages.iter().map(|m| m.message_id.as_str()),
                    PreconfirmedState::InFlight,
                );
                let tx = InFlightTx::new(built, messages);
                if let Err(err) = self.tracker.track(tx).await {
                    tracing::error!(error = %err, "Failed to start tracking");
                }
            }
            Err(error) => {
                // Never broadcast successfully, so the nonce goes back.
                self.nonces.release_acquired(built.nonce).await;
                for m in &messages {
                    self.states.remove(&m.message_id);
                }
                tracing::error!(
                    hash = %built.hash,
                    nonce = built.nonce,
                    error = %error,
                    "Send exhausted retries, surfacing terminal error"
                );
                let tx = InFlightTx::failed(built, messages, error);
                self.dispatcher.dispatch(tx).await;
            }
        }
    }
}
