use std::sync::Arc;

use alloy::{
    consensus::{TxEip1559, TxEnvelope},
    primitives::{Address, B256, TxKind},
    rpc::types::{TransactionInput, TransactionRequest as CallRequest},
};
use relay_core::{
    chain::ChainClient, error::RelayError, signer::TransactionSigner, transaction::TxRequest,
};

use crate::{
    batcher::{self, CallPlan},
    nonce::NonceManager,
};

/// A signed, network-ready transaction together with the request ids it
/// carries.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    /// Unsigned payload, kept so replacement can rewrite fees or nonce and
    /// re-sign without rebuilding from requests.
    pub tx: TxEip1559,
    pub envelope: TxEnvelope,
    pub hash: B256,
    pub nonce: u64,
    pub message_ids: Vec<String>,
}

/// Build failure that remembers whether a nonce was already assigned.
///
/// The factory does not release the nonce itself; the caller decides whether
/// to release it or to leave the gap for a later rebuild.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct BuildFailure {
    pub error: RelayError,
    pub acquired_nonce: Option<u64>,
}

impl BuildFailure {
    fn before_nonce(error: RelayError) -> Self {
        Self {
            error,
            acquired_nonce: None,
        }
    }
}

/// Turns one or more requests into a single signed transaction.
pub struct TransactionFactory<C, S> {
    chain: Arc<C>,
    signer: Arc<S>,
    nonces: Arc<NonceManager<C>>,
    aggregator: Address,
}

impl<C: ChainClient, S: TransactionSigner> TransactionFactory<C, S> {
    pub fn new(
        chain: Arc<C>,
        signer: Arc<S>,
        nonces: Arc<NonceManager<C>>,
        aggregator: Address,
    ) -> Self {
        Self {
            chain,
            signer,
            nonces,
            aggregator,
        }
    }

    /// Build and sign a transaction for the given requests. A single request
    /// becomes a direct call; several are folded through the aggregator.
    pub async fn build_transaction_from_requests(
        &self,
        requests: &[TxRequest],
    ) -> Result<BuiltTransaction, BuildFailure> {
        let plan = match requests {
            [] => {
                return Err(BuildFailure::before_nonce(RelayError::ValidationError {
                    message: "cannot build a transaction from zero requests".to_string(),
                }));
            }
            [single] => CallPlan::from_single(single),
            many => batcher::fold_requests(self.aggregator, many),
        };

        let nonce = self
            .nonces
            .acquire()
            .await
            .map_err(BuildFailure::before_nonce)?;

        let fail = |error: RelayError| BuildFailure {
            error,
            acquired_nonce: Some(nonce),
        };

        let (max_fee_per_gas, max_priority_fee_per_gas) =
            match (plan.max_fee_per_gas, plan.max_priority_fee_per_gas) {
                (Some(fee), Some(tip)) => (fee, tip),
                (fee, tip) => {
                    let estimate = self.chain.estimate_fees().await.map_err(fail)?;
                    (
                        fee.unwrap_or(estimate.max_fee_per_gas),
                        tip.unwrap_or(estimate.max_priority_fee_per_gas),
                    )
                }
            };

        let gas_limit = match plan.gas_limit {
            Some(limit) => limit,
            None => {
                let call = CallRequest {
                    from: Some(self.signer.address()),
                    to: Some(TxKind::Call(plan.to)),
                    value: Some(plan.value),
                    input: TransactionInput::new(plan.data.clone()),
                    ..Default::default()
                };
                self.chain.estimate_gas(call).await.map_err(fail)?
            }
        };

        let tx = TxEip1559 {
            chain_id: self.chain.chain_id(),
            nonce,
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            to: TxKind::Call(plan.to),
            value: plan.value,
            access_list: Default::default(),
            input: plan.data,
        };

        let envelope = self.signer.sign(tx.clone()).await.map_err(fail)?;
        let hash = *envelope.tx_hash();

        tracing::debug!(
            hash = %hash,
            nonce,
            requests = requests.len(),
            batched = requests.len() > 1,
            "Built transaction"
        );

        Ok(BuiltTransaction {
            tx,
            envelope,
            hash,
            nonce,
            message_ids: requests.iter().map(|r| r.message_id.clone()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use alloy::{
        consensus::TxEnvelope,
        primitives::{Bytes, B256, U256},
        rpc::types::TransactionReceipt,
    };
    use relay_core::{
        chain::{FeeEstimate, MempoolContent},
        constants::MULTICALL3_ADDRESS,
        signer::LocalTransactionSigner,
    };

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    struct StubChain {
        fee_calls: AtomicU64,
        gas_calls: AtomicU64,
        fail_gas_estimate: bool,
    }

    impl StubChain {
        fn new() -> Self {
            Self {
                fee_calls: AtomicU64::new(0),
                gas_calls: AtomicU64::new(0),
                fail_gas_estimate: false,
            }
        }
    }

    impl ChainClient for StubChain {
        fn chain_id(&self) -> u64 {
            31337
        }

        async fn pending_nonce(&self, _address: Address) -> Result<u64, RelayError> {
            Ok(9)
        }

        async fn estimate_fees(&self) -> Result<FeeEstimate, RelayError> {
            self.fee_calls.fetch_add(1, Ordering::Relaxed);
            Ok(FeeEstimate {
                max_fee_per_gas: 2_000,
                max_priority_fee_per_gas: 100,
            })
        }

        async fn estimate_gas(&self, _call: CallRequest) -> Result<u64, RelayError> {
            self.gas_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_gas_estimate {
                return Err(RelayError::InternalError {
                    message: "gas estimation unavailable".to_string(),
                });
            }
            Ok(70_000)
        }

        async fn broadcast(&self, _envelope: &TxEnvelope) -> Result<B256, RelayError> {
            unimplemented!()
        }

        async fn receipt(&self, _hash: B256) -> Result<Option<TransactionReceipt>, RelayError> {
            unimplemented!()
        }

        async fn mempool_content(&self, _address: Address) -> Result<MempoolContent, RelayError> {
            unimplemented!()
        }
    }

    fn factory(chain: Arc<StubChain>) -> TransactionFactory<StubChain, LocalTransactionSigner> {
        let signer = Arc::new(LocalTransactionSigner::from_hex_key(TEST_KEY).unwrap());
        let nonces = Arc::new(NonceManager::new(chain.clone(), signer.address()));
        TransactionFactory::new(chain, signer, nonces, MULTICALL3_ADDRESS)
    }

    fn request() -> TxRequest {
        TxRequest::new(Address::repeat_byte(0x42), U256::from(1u64), Bytes::new())
    }

    #[tokio::test]
    async fn test_zero_requests_is_a_validation_error() {
        let chain = Arc::new(StubChain::new());
        let factory = factory(chain);

        let failure = factory
            .build_transaction_from_requests(&[])
            .await
            .expect_err("empty batch must not build");
        assert!(matches!(failure.error, RelayError::ValidationError { .. }));
        assert_eq!(failure.acquired_nonce, None);
    }

    #[tokio::test]
    async fn test_explicit_parameters_skip_chain_estimation() {
        let chain = Arc::new(StubChain::new());
        let factory = factory(chain.clone());

        let req = request().with_gas_limit(21_000).with_fees(500, 50);
        let built = factory
            .build_transaction_from_requests(&[req])
            .await
            .unwrap();

        assert_eq!(built.nonce, 9);
        assert_eq!(built.tx.gas_limit, 21_000);
        assert_eq!(built.tx.max_fee_per_gas, 500);
        assert_eq!(built.tx.max_priority_fee_per_gas, 50);
        assert_eq!(chain.fee_calls.load(Ordering::Relaxed), 0);
        assert_eq!(chain.gas_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_missing_parameters_come_from_the_chain() {
        let chain = Arc::new(StubChain::new());
        let factory = factory(chain.clone());

        let built = factory
            .build_transaction_from_requests(&[request()])
            .await
            .unwrap();

        assert_eq!(built.tx.gas_limit, 70_000);
        assert_eq!(built.tx.max_fee_per_gas, 2_000);
        assert_eq!(built.tx.max_priority_fee_per_gas, 100);
        assert_eq!(chain.fee_calls.load(Ordering::Relaxed), 1);
        assert_eq!(chain.gas_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_partial_fees_fill_only_the_gap() {
        let chain = Arc::new(StubChain::new());
        let factory = factory(chain.clone());

        let mut req = request().with_gas_limit(21_000);
        req.max_fee_per_gas = Some(5_000);
        let built = factory
            .build_transaction_from_requests(&[req])
            .await
            .unwrap();

        // Explicit cap kept, missing tip estimated.
        assert_eq!(built.tx.max_fee_per_gas, 5_000);
        assert_eq!(built.tx.max_priority_fee_per_gas, 100);
        assert_eq!(chain.fee_calls.load(Ordering::Relaxed), 1);
        assert_eq!(chain.gas_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_failed_estimate_reports_the_acquired_nonce() {
        let mut chain = StubChain::new();
        chain.fail_gas_estimate = true;
        let factory = factory(Arc::new(chain));

        let failure = factory
            .build_transaction_from_requests(&[request()])
            .await
            .expect_err("gas estimation failure must surface");
        assert_eq!(failure.acquired_nonce, Some(9));
        assert!(matches!(failure.error, RelayError::InternalError { .. }));
    }
}
