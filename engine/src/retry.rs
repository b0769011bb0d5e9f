use std::{collections::HashMap, sync::Mutex, time::Duration};

use alloy::primitives::B256;
use rand::Rng;

/// Per-transaction-hash retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryInfo {
    pub attempts: u32,
    /// Next base backoff, before jitter.
    pub backoff: Duration,
}

/// Exponential backoff with bounded jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub start: Duration,
    pub multiplier: u32,
    pub ceiling: Duration,
    pub max_jitter: Duration,
    pub max_attempts: u32,
}

impl ExponentialBackoff {
    /// Broadcast-level policy: a few quick attempts around one send call.
    pub fn sender_defaults() -> Self {
        Self {
            start: Duration::from_millis(500),
            multiplier: 2,
            ceiling: Duration::from_secs(3),
            max_jitter: Duration::from_millis(1000),
            max_attempts: 3,
        }
    }

    /// Top-level policy for long-lived background work. A different layer
    /// than the sender policy; the two are never interchangeable.
    pub fn job_defaults() -> Self {
        Self {
            start: Duration::from_secs(1),
            multiplier: 2,
            ceiling: Duration::from_secs(120),
            max_jitter: Duration::from_millis(1000),
            max_attempts: u32::MAX,
        }
    }
}

/// Closed set of retry strategies, selected at construction time.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    Exponential(ExponentialBackoff),
}

impl RetryPolicy {
    fn config(&self) -> &ExponentialBackoff {
        match self {
            RetryPolicy::Exponential(config) => config,
        }
    }
}

/// Tracks retry state per transaction hash under one lock.
///
/// Replacement re-keys an entry to the new hash so attempt history survives
/// fee bumps and nonce rewrites.
pub struct RetryTracker {
    policy: RetryPolicy,
    state: Mutex<HashMap<B256, RetryInfo>>,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failed attempt for `hash`. Returns the jittered backoff to
    /// sleep before the next attempt, or `None` once attempts are exhausted.
    pub fn next_backoff(&self, hash: B256) -> Option<Duration> {
        let config = self.policy.config();
        let mut state = self.state.lock().expect("retry state lock poisoned");

        let info = state.entry(hash).or_insert(RetryInfo {
            attempts: 0,
            backoff: config.start,
        });

        if info.attempts >= config.max_attempts {
            return None;
        }
        info.attempts += 1;

        let base = info.backoff.min(config.ceiling);
        info.backoff = info
            .backoff
            .checked_mul(config.multiplier)
            .unwrap_or(config.ceiling)
            .min(config.ceiling);

        let jitter_ms = rand::rng().random_range(0..=config.max_jitter.as_millis() as u64);
        Some(base + Duration::from_millis(jitter_ms))
    }

    /// A successful broadcast clears the hash's retry state.
    pub fn clear(&self, hash: B256) {
        let mut state = self.state.lock().expect("retry state lock poisoned");
        state.remove(&hash);
    }

    /// Transfer retry history from a replaced transaction to its
    /// replacement.
    pub fn rekey(&self, old: B256, new: B256) {
        let mut state = self.state.lock().expect("retry state lock poisoned");
        if let Some(info) = state.remove(&old) {
            state.insert(new, info);
        }
    }

    pub fn info(&self, hash: B256) -> Option<RetryInfo> {
        let state = self.state.lock().expect("retry state lock poisoned");
        state.get(&hash).copied()
    }
}
