use std::time::Duration;

use alloy::primitives::Address;
use relay_core::constants::{
    DEFAULT_MEMPOOL_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECEIPT_TIMEOUT_MS,
    MULTICALL3_ADDRESS,
};
use serde::{Deserialize, Serialize};

/// Engine tuning knobs. Loaded once at startup, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of requests folded into one transaction.
    pub tx_batch_size: usize,

    /// How long to wait while assembling a batch.
    pub tx_batch_timeout_ms: u64,

    /// Keep collecting for the full batch window even once `tx_batch_size`
    /// is reached, instead of firing early.
    pub wait_full_batch_timeout: bool,

    /// Idle sleep when the queue comes back empty.
    pub empty_queue_delay_ms: u64,

    /// Window for a broadcast transaction to show up in the mempool before
    /// it is presumed lost.
    pub mempool_timeout_ms: u64,

    /// Window for a mempool-visible transaction to be mined before it is
    /// considered stale.
    pub receipt_timeout_ms: u64,

    /// Interval between mempool/receipt polls while tracking.
    pub poll_interval_ms: u64,

    /// Visibility lease taken on queue messages while a batch is in the
    /// pipeline; messages reappear after this lapses without an ack.
    pub queue_lease_ms: u64,

    /// Multicall aggregator contract used for batches of more than one
    /// request.
    pub aggregator_address: Address,

    /// Inbound buffer capacity for each event subscriber.
    pub dispatcher_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tx_batch_size: 10,
            tx_batch_timeout_ms: 1_000,
            wait_full_batch_timeout: false,
            empty_queue_delay_ms: 1_000,
            mempool_timeout_ms: DEFAULT_MEMPOOL_TIMEOUT_MS,
            receipt_timeout_ms: DEFAULT_RECEIPT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            queue_lease_ms: 5 * 60 * 1_000,
            aggregator_address: MULTICALL3_ADDRESS,
            dispatcher_buffer: 64,
        }
    }
}

impl EngineConfig {
    pub fn tx_batch_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_batch_timeout_ms)
    }

    pub fn empty_queue_delay(&self) -> Duration {
        Duration::from_millis(self.empty_queue_delay_ms)
    }

    pub fn mempool_timeout(&self) -> Duration {
        Duration::from_millis(self.mempool_timeout_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn queue_lease(&self) -> Duration {
        Duration::from_millis(self.queue_lease_ms)
    }
}
