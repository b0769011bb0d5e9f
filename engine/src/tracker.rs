use std::{fmt::Display, sync::Arc, time::Duration};

use alloy::{
    consensus::{TxEip1559, TxEnvelope},
    primitives::{Address, B256},
    rpc::types::TransactionReceipt,
};
use relay_core::{
    chain::{ChainClient, MempoolPosition},
    error::RelayError,
};
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, time::Instant};

use crate::{dispatcher::EventDispatcher, factory::BuiltTransaction, nonce::NonceManager};

/// Links a transaction back to the queue messages it carries.
#[derive(Debug, Clone)]
pub struct MessageRef {
    /// Queue receipt handle, acknowledged on success.
    pub receipt_id: String,
    /// Caller-visible correlation id.
    pub message_id: String,
}

/// Post-broadcast outcome of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Success,
    Reverted,
    Stale,
    Error,
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Success => write!(f, "success"),
            Status::Reverted => write!(f, "reverted"),
            Status::Stale => write!(f, "stale"),
            Status::Error => write!(f, "error"),
        }
    }
}

/// A broadcast transaction awaiting a terminal outcome, plus everything a
/// subscriber needs to act on that outcome.
#[derive(Debug, Clone)]
pub struct InFlightTx {
    pub hash: B256,
    pub nonce: u64,
    /// Unsigned payload, kept for fee-bump replacement.
    pub tx: TxEip1559,
    pub envelope: TxEnvelope,
    pub messages: Vec<MessageRef>,
    pub receipt: Option<TransactionReceipt>,
    pub error: Option<RelayError>,
    pub is_stale: bool,
}

impl InFlightTx {
    pub fn new(built: BuiltTransaction, messages: Vec<MessageRef>) -> Self {
        Self {
            hash: built.hash,
            nonce: built.nonce,
            tx: built.tx,
            envelope: built.envelope,
            messages,
            receipt: None,
            error: None,
            is_stale: false,
        }
    }

    /// A transaction that terminally failed before or during broadcast.
    pub fn failed(built: BuiltTransaction, messages: Vec<MessageRef>, error: RelayError) -> Self {
        let mut tx = Self::new(built, messages);
        tx.error = Some(error);
        tx
    }

    /// Status is fully derived from the error/receipt/staleness fields, in
    /// that priority order.
    pub fn status(&self) -> Status {
        if self.error.is_some() {
            return Status::Error;
        }
        match &self.receipt {
            Some(receipt) => {
                if receipt.status() {
                    Status::Success
                } else {
                    Status::Reverted
                }
            }
            None => {
                if self.is_stale {
                    Status::Stale
                } else {
                    Status::Pending
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub mempool_timeout: Duration,
    pub receipt_timeout: Duration,
}

/// Observes in-flight transactions until a terminal outcome and publishes
/// the result.
pub struct Tracker<C> {
    chain: Arc<C>,
    nonces: Arc<NonceManager<C>>,
    dispatcher: Arc<EventDispatcher<InFlightTx>>,
    config: TrackerConfig,
    shutdown: watch::Receiver<bool>,
}

impl<C> Clone for Tracker<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            nonces: self.nonces.clone(),
            dispatcher: self.dispatcher.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<C: ChainClient> Tracker<C> {
    pub fn new(
        chain: Arc<C>,
        nonces: Arc<NonceManager<C>>,
        dispatcher: Arc<EventDispatcher<InFlightTx>>,
        config: TrackerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            chain,
            nonces,
            dispatcher,
            config,
            shutdown,
        }
    }

    /// Register the transaction as in-flight and start its observation task.
    /// Exactly one task observes each tracked transaction.
    pub async fn track(&self, tx: InFlightTx) -> Result<(), RelayError> {
        self.nonces.mark_in_flight(tx.nonce, tx.hash).await?;

        let tracker = self.clone();
        tokio::spawn(async move {
            if let Some(tx) = tracker.observe(tx).await {
                tracker.finish(tx).await;
            }
        });
        Ok(())
    }

    /// Poll mempool and receipts until the transaction resolves. Returns
    /// `None` only on process shutdown, where tracking is abandoned without
    /// a terminal state.
    async fn observe(&self, mut tx: InFlightTx) -> Option<InFlightTx> {
        let mempool_deadline = Instant::now() + self.config.mempool_timeout;
        let mut receipt_deadline: Option<Instant> = None;

        loop {
            if *self.shutdown.borrow() {
                tracing::debug!(hash = %tx.hash, "Shutdown during tracking, abandoning");
                return None;
            }

            // A mined receipt resolves the transaction at any point.
            match self.chain.receipt(tx.hash).await {
                Ok(Some(mut receipt)) => {
                    self.backfill_create_address(&mut receipt, tx.nonce);
                    tx.receipt = Some(receipt);
                    return Some(tx);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(hash = %tx.hash, error = %err, "Receipt poll failed");
                }
            }

            if receipt_deadline.is_none() {
                match self.chain.mempool_content(self.nonces.sender()).await {
                    Ok(content) => match content.position_of(tx.hash) {
                        Some(MempoolPosition::Pending) => {
                            // Accepted by the network; switch to the longer
                            // wait for a mined receipt.
                            tracing::debug!(hash = %tx.hash, "Seen in pending mempool");
                            receipt_deadline = Some(Instant::now() + self.config.receipt_timeout);
                        }
                        Some(MempoolPosition::Queued) => {
                            // Blocked on a nonce gap; cannot execute as-is.
                            tracing::warn!(hash = %tx.hash, nonce = tx.nonce, "Seen in queued mempool, marking stale");
                            tx.is_stale = true;
                            return Some(tx);
                        }
                        None => {}
                    },
                    Err(err) => {
                        tracing::warn!(hash = %tx.hash, error = %err, "Mempool poll failed");
                    }
                }
            }

            let now = Instant::now();
            let expired = match receipt_deadline {
                Some(deadline) => now >= deadline,
                None => now >= mempool_deadline,
            };
            if expired {
                tx.is_stale = true;
                return Some(tx);
            }

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    async fn finish(&self, tx: InFlightTx) {
        let removed = self.nonces.remove_in_flight(tx.nonce).await;
        tracing::info!(
            hash = %tx.hash,
            nonce = tx.nonce,
            status = %tx.status(),
            removed_in_flight = removed,
            "Transaction reached terminal tracking state"
        );
        self.dispatcher.dispatch(tx).await;
    }

    /// Some RPC implementations omit the created-contract address; derive it
    /// from sender and nonce when the receipt is for a creation.
    fn backfill_create_address(&self, receipt: &mut TransactionReceipt, nonce: u64) {
        if receipt.to.is_none() && receipt.contract_address.is_none() {
            let created: Address = self.nonces.sender().create(nonce);
            receipt.contract_address = Some(created);
            tracing::debug!(address = %created, "Backfilled contract creation address");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        consensus::{Receipt, ReceiptEnvelope, ReceiptWithBloom},
        primitives::{Address, Bytes, TxKind, U256},
        signers::Signature,
    };

    fn signed_envelope(tx: &TxEip1559) -> TxEnvelope {
        use alloy::consensus::SignableTransaction;
        let signature = Signature::new(U256::from(1u64), U256::from(1u64), false);
        TxEnvelope::Eip1559(tx.clone().into_signed(signature))
    }

    fn in_flight() -> InFlightTx {
        let tx = TxEip1559 {
            chain_id: 31337,
            nonce: 1,
            gas_limit: 21_000,
            max_fee_per_gas: 100,
            max_priority_fee_per_gas: 10,
            to: TxKind::Call(Address::ZERO),
            value: U256::ZERO,
            access_list: Default::default(),
            input: Bytes::new(),
        };
        let envelope = signed_envelope(&tx);
        InFlightTx {
            hash: *envelope.tx_hash(),
            nonce: 1,
            tx,
            envelope,
            messages: Vec::new(),
            receipt: None,
            error: None,
            is_stale: false,
        }
    }

    fn receipt(success: bool) -> TransactionReceipt {
        TransactionReceipt {
            inner: ReceiptEnvelope::Eip1559(ReceiptWithBloom {
                receipt: Receipt {
                    status: success.into(),
                    cumulative_gas_used: 21_000,
                    logs: Vec::new(),
                },
                logs_bloom: Default::default(),
            }),
            transaction_hash: B256::ZERO,
            transaction_index: Some(0),
            block_hash: None,
            block_number: Some(1),
            gas_used: 21_000,
            effective_gas_price: 100,
            blob_gas_used: None,
            blob_gas_price: None,
            from: Address::ZERO,
            to: Some(Address::ZERO),
            contract_address: None,
        }
    }

    #[test]
    fn test_status_derivation_is_deterministic() {
        let mut tx = in_flight();
        assert_eq!(tx.status(), Status::Pending);

        tx.is_stale = true;
        assert_eq!(tx.status(), Status::Stale);

        tx.receipt = Some(receipt(true));
        assert_eq!(tx.status(), Status::Success);

        tx.receipt = Some(receipt(false));
        assert_eq!(tx.status(), Status::Reverted);

        // An error wins over every other field.
        tx.error = Some(RelayError::InternalError {
            message: "boom".to_string(),
        });
        assert_eq!(tx.status(), Status::Error);
    }
}
