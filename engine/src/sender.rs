use std::sync::Arc;

use alloy::consensus::TxEip1559;
use relay_core::{chain::ChainClient, error::RelayError, signer::TransactionSigner};

use crate::{
    factory::BuiltTransaction, nonce::NonceManager, retry::RetryTracker, tracker::InFlightTx,
};

/// Broadcast failure classes the sender acts on, mapped from the chain's
/// JSON-RPC error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastErrorKind {
    /// The nonce was already consumed on chain.
    NonceTooLow,
    /// A transaction with this nonce sits in the pool at a higher price.
    ReplacementUnderpriced,
    /// The pool already holds this exact transaction.
    AlreadyKnown,
    Other,
}

pub fn classify_broadcast_error(error: &RelayError) -> BroadcastErrorKind {
    let RelayError::ChainError { code, message } = error else {
        return BroadcastErrorKind::Other;
    };
    if *code != -32000 {
        return BroadcastErrorKind::Other;
    }

    let msg = message.to_lowercase();
    if msg.contains("nonce too low") {
        BroadcastErrorKind::NonceTooLow
    } else if msg.contains("replacement") && msg.contains("underpriced") {
        BroadcastErrorKind::ReplacementUnderpriced
    } else if msg.contains("already known") || msg.contains("duplicate") {
        BroadcastErrorKind::AlreadyKnown
    } else {
        BroadcastErrorKind::Other
    }
}

/// Fee-bump replacement. Integer math, 115 means +15%.
#[derive(Debug, Clone)]
pub struct GasBumpReplacement {
    pub bump_multiplier: u32,
}

impl Default for GasBumpReplacement {
    fn default() -> Self {
        Self {
            bump_multiplier: 115,
        }
    }
}

impl GasBumpReplacement {
    pub fn bump_fees(&self, tx: &mut TxEip1559) {
        tx.max_fee_per_gas = tx.max_fee_per_gas * self.bump_multiplier as u128 / 100;
        tx.max_priority_fee_per_gas =
            tx.max_priority_fee_per_gas * self.bump_multiplier as u128 / 100;
    }
}

/// Closed set of replacement strategies, selected at construction time.
#[derive(Debug, Clone)]
pub enum ReplacementPolicy {
    GasBump(GasBumpReplacement),
}

impl Default for ReplacementPolicy {
    fn default() -> Self {
        ReplacementPolicy::GasBump(GasBumpReplacement::default())
    }
}

/// Delivers signed transactions to the network, applying retry and
/// replacement policy on failure.
pub struct Sender<C, S> {
    chain: Arc<C>,
    signer: Arc<S>,
    nonces: Arc<NonceManager<C>>,
    retries: Arc<RetryTracker>,
    replacement: ReplacementPolicy,
}

impl<C: ChainClient, S: TransactionSigner> Sender<C, S> {
    pub fn new(
        chain: Arc<C>,
        signer: Arc<S>,
        nonces: Arc<NonceManager<C>>,
        retries: Arc<RetryTracker>,
        replacement: ReplacementPolicy,
    ) -> Self {
        Self {
            chain,
            signer,
            nonces,
            retries,
            replacement,
        }
    }

    /// Broadcast with recovery. On nonce/price conflicts the transaction is
    /// rewritten in place (new hash, possibly new nonce) before the next
    /// attempt; retry history follows the rewrite. Returns the terminal
    /// error once the retry policy is exhausted.
    pub async fn send_transaction(&self, built: &mut BuiltTransaction) -> Result<(), RelayError> {
        loop {
            match self.chain.broadcast(&built.envelope).await {
                Ok(_) => {
                    tracing::debug!(hash = %built.hash, nonce = built.nonce, "Broadcast accepted");
                    self.retries.clear(built.hash);
                    return Ok(());
                }
                Err(error) => {
                    let kind = classify_broadcast_error(&error);
                    tracing::warn!(
                        hash = %built.hash,
                        nonce = built.nonce,
                        kind = ?kind,
                        error = %error,
                        "Broadcast failed"
                    );

                    match kind {
                        BroadcastErrorKind::AlreadyKnown => {
                            // The pool has it; tracking will resolve it.
                            self.retries.clear(built.hash);
                            return Ok(());
                        }
                        BroadcastErrorKind::NonceTooLow => {
                            self.replace(built, true).await?;
                        }
                        BroadcastErrorKind::ReplacementUnderpriced => {
                            self.replace(built, false).await?;
                        }
                        BroadcastErrorKind::Other => {}
                    }

                    match self.retries.next_backoff(built.hash) {
                        Some(backoff) => tokio::time::sleep(backoff).await,
                        None => return Err(error),
                    }
                }
            }
        }
    }

    /// Build, sign and resubmit a replacement for a stale or errored
    /// transaction, returning it for re-tracking. Stale transactions keep
    /// their nonce with bumped fees; a recorded nonce-too-low error gets a
    /// fresh nonce as well.
    pub async fn resubmit_replacement(
        &self,
        terminal: &InFlightTx,
    ) -> Result<BuiltTransaction, RelayError> {
        let fresh_nonce = terminal
            .error
            .as_ref()
            .is_some_and(|e| classify_broadcast_error(e) == BroadcastErrorKind::NonceTooLow);

        let mut built = BuiltTransaction {
            tx: terminal.tx.clone(),
            envelope: terminal.envelope.clone(),
            hash: terminal.hash,
            nonce: terminal.nonce,
            message_ids: terminal
                .messages
                .iter()
                .map(|m| m.message_id.clone())
                .collect(),
        };

        self.replace(&mut built, fresh_nonce).await?;
        self.send_transaction(&mut built).await?;
        Ok(built)
    }

    /// Rewrite a transaction per the replacement policy: optionally a fresh
    /// nonce, always a fee bump (the bump also applies after a nonce bump),
    /// then re-sign and re-key retry history onto the new hash.
    async fn replace(
        &self,
        built: &mut BuiltTransaction,
        fresh_nonce: bool,
    ) -> Result<(), RelayError> {
        let old_hash = built.hash;
        let mut tx = built.tx.clone();

        if fresh_nonce {
            // The old nonce was consumed by someone else; give it back
            // before asking for the real next one.
            self.nonces.release_acquired(tx.nonce).await;
            tx.nonce = self.nonces.acquire().await?;
        }

        let ReplacementPolicy::GasBump(bump) = &self.replacement;
        bump.bump_fees(&mut tx);

        let envelope = self.signer.sign(tx.clone()).await?;
        let new_hash = *envelope.tx_hash();
        self.retries.rekey(old_hash, new_hash);

        tracing::info!(
            old_hash = %old_hash,
            new_hash = %new_hash,
            nonce = tx.nonce,
            nonce_rewritten = fresh_nonce,
            max_fee_per_gas = tx.max_fee_per_gas,
            "Replaced transaction"
        );

        built.nonce = tx.nonce;
        built.tx = tx;
        built.envelope = envelope;
        built.hash = new_hash;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, TxKind, U256};

    fn chain_error(message: &str) -> RelayError {
        RelayError::ChainError {
            code: -32000,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_nonce_too_low_classification() {
        assert_eq!(
            classify_broadcast_error(&chain_error("nonce too low: next nonce 5")),
            BroadcastErrorKind::NonceTooLow
        );
    }

    #[test]
    fn test_replacement_underpriced_classification() {
        assert_eq!(
            classify_broadcast_error(&chain_error("replacement transaction underpriced")),
            BroadcastErrorKind::ReplacementUnderpriced
        );
    }

    #[test]
    fn test_already_known_classification() {
        assert_eq!(
            classify_broadcast_error(&chain_error("already known")),
            BroadcastErrorKind::AlreadyKnown
        );
        assert_eq!(
            classify_broadcast_error(&chain_error("duplicate transaction")),
            BroadcastErrorKind::AlreadyKnown
        );
    }

    #[test]
    fn test_non_chain_errors_are_other() {
        assert_eq!(
            classify_broadcast_error(&RelayError::InternalError {
                message: "nonce too low".to_string()
            }),
            BroadcastErrorKind::Other
        );
        assert_eq!(
            classify_broadcast_error(&RelayError::ChainError {
                code: -32601,
                message: "nonce too low".to_string()
            }),
            BroadcastErrorKind::Other
        );
    }

    #[test]
    fn test_gas_bump_is_integer_115_percent() {
        let mut tx = TxEip1559 {
            chain_id: 1,
            nonce: 0,
            gas_limit: 21_000,
            max_fee_per_gas: 1_000,
            max_priority_fee_per_gas: 101,
            to: TxKind::Call(Address::ZERO),
            value: U256::ZERO,
            access_list: Default::default(),
            input: Bytes::new(),
        };

        GasBumpReplacement::default().bump_fees(&mut tx);

        assert_eq!(tx.max_fee_per_gas, 1_150);
        // 101 * 115 / 100 = 116.15, rounded down.
        assert_eq!(tx.max_priority_fee_per_gas, 116);
    }
}
