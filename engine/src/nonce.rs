use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use alloy::primitives::{Address, B256};
use relay_core::{chain::ChainClient, error::RelayError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Observability snapshot of the nonce sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceStats {
    pub acquired: usize,
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct NonceSets {
    /// Assigned but not yet broadcast.
    acquired: BTreeSet<u64>,
    /// Broadcast and awaiting a terminal outcome, keyed by nonce so the
    /// highest in-flight nonce is an O(log n) lookup and gaps are visible.
    in_flight: BTreeMap<u64, B256>,
}

impl NonceSets {
    fn next_assigned(&self) -> Option<u64> {
        let from_in_flight = self.in_flight.keys().next_back().map(|n| n + 1);
        let from_acquired = self.acquired.iter().next_back().map(|n| n + 1);
        from_in_flight.max(from_acquired)
    }
}

/// Single source of truth for "what nonce comes next" for one sender.
///
/// An owned, lock-guarded instance injected into every component that needs
/// it; never process-global, so multiple senders coexist in tests.
pub struct NonceManager<C> {
    chain: Arc<C>,
    sender: Address,
    sets: Mutex<NonceSets>,
}

impl<C: ChainClient> NonceManager<C> {
    pub fn new(chain: Arc<C>, sender: Address) -> Self {
        Self {
            chain,
            sender,
            sets: Mutex::new(NonceSets::default()),
        }
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Assign the next nonce and record it in the acquired set.
    ///
    /// The lock is held across the whole decision, including the pending
    /// nonce query on first acquisition, so two concurrent callers can never
    /// receive the same value. A chain-read failure surfaces to the caller
    /// and assigns nothing.
    pub async fn acquire(&self) -> Result<u64, RelayError> {
        let mut sets = self.sets.lock().await;

        let nonce = match sets.next_assigned() {
            Some(next) => next,
            None => self.chain.pending_nonce(self.sender).await?,
        };

        sets.acquired.insert(nonce);
        tracing::debug!(sender = %self.sender, nonce, "Nonce acquired");
        Ok(nonce)
    }

    /// Move a nonce from acquired to in-flight. Fails if another transaction
    /// already holds the nonce in-flight.
    pub async fn mark_in_flight(&self, nonce: u64, hash: B256) -> Result<(), RelayError> {
        let mut sets = self.sets.lock().await;

        if let Some(existing) = sets.in_flight.get(&nonce) {
            return Err(RelayError::InternalError {
                message: format!("nonce {nonce} already in flight with hash {existing}"),
            });
        }

        sets.acquired.remove(&nonce);
        sets.in_flight.insert(nonce, hash);
        tracing::debug!(sender = %self.sender, nonce, hash = %hash, "Nonce marked in-flight");
        Ok(())
    }

    /// Drop a nonce from the in-flight set on terminal outcome. Returns
    /// whether this call removed it; the lock makes removal happen at most
    /// once per tracked transaction.
    pub async fn remove_in_flight(&self, nonce: u64) -> bool {
        let mut sets = self.sets.lock().await;
        let removed = sets.in_flight.remove(&nonce).is_some();
        if removed {
            tracing::debug!(sender = %self.sender, nonce, "Nonce removed from in-flight");
        }
        removed
    }

    /// Give back a nonce that was acquired but will never be broadcast.
    /// Without this, a failed build leaks the nonce and leaves a gap.
    pub async fn release_acquired(&self, nonce: u64) -> bool {
        let mut sets = self.sets.lock().await;
        let released = sets.acquired.remove(&nonce);
        if released {
            tracing::debug!(sender = %self.sender, nonce, "Acquired nonce released");
        }
        released
    }

    pub async fn stats(&self) -> NonceStats {
        let sets = self.sets.lock().await;
        NonceStats {
            acquired: sets.acquired.len(),
            in_flight: sets.in_flight.len(),
        }
    }
}
