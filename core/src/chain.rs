use alloy::{
    consensus::TxEnvelope,
    eips::eip2718::Encodable2718,
    network::TransactionResponse,
    primitives::{Address, B256},
    providers::{Provider, ProviderBuilder, RootProvider, ext::TxPoolApi},
    rpc::types::{TransactionReceipt, TransactionRequest as CallRequest},
    transports::http::reqwest::Url,
};

use crate::error::{AlloyRpcErrorToRelayError, RelayError};

/// Chain-suggested EIP-1559 fee parameters.
#[derive(Debug, Clone, Copy)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Where a transaction sits in the node's transaction pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MempoolPosition {
    /// Executable now.
    Pending,
    /// Blocked on a nonce gap.
    Queued,
}

/// Pool contents for one sender, reduced to transaction hashes.
#[derive(Debug, Clone, Default)]
pub struct MempoolContent {
    pub pending: Vec<B256>,
    pub queued: Vec<B256>,
}

impl MempoolContent {
    pub fn position_of(&self, hash: B256) -> Option<MempoolPosition> {
        if self.pending.contains(&hash) {
            Some(MempoolPosition::Pending)
        } else if self.queued.contains(&hash) {
            Some(MempoolPosition::Queued)
        } else {
            None
        }
    }
}

/// Read/broadcast capability against one chain.
///
/// Everything the engine needs from the ledger goes through this seam, so
/// tests can substitute a scripted chain.
pub trait ChainClient: Send + Sync + 'static {
    fn chain_id(&self) -> u64;

    /// The sender's next nonce including mempool contents.
    fn pending_nonce(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<u64, RelayError>> + Send;

    fn estimate_fees(&self) -> impl Future<Output = Result<FeeEstimate, RelayError>> + Send;

    /// Dry-run gas estimation for an unsigned call.
    fn estimate_gas(
        &self,
        call: CallRequest,
    ) -> impl Future<Output = Result<u64, RelayError>> + Send;

    /// Broadcast a signed transaction, returning its hash.
    fn broadcast(
        &self,
        envelope: &TxEnvelope,
    ) -> impl Future<Output = Result<B256, RelayError>> + Send;

    fn receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, RelayError>> + Send;

    /// Pending/queued pool contents for one sender address.
    fn mempool_content(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<MempoolContent, RelayError>> + Send;
}

/// `ChainClient` over a plain HTTP JSON-RPC endpoint.
#[derive(Clone)]
pub struct HttpChainClient {
    chain_id: u64,
    provider: RootProvider,
}

impl HttpChainClient {
    pub fn new(chain_id: u64, rpc_url: Url) -> Self {
        Self {
            chain_id,
            provider: ProviderBuilder::new()
                .disable_recommended_fillers()
                .connect_http(rpc_url),
        }
    }

    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }
}

impl ChainClient for HttpChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, RelayError> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| e.to_relay_error())
    }

    async fn estimate_fees(&self) -> Result<FeeEstimate, RelayError> {
        let estimate = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| e.to_relay_error())?;

        Ok(FeeEstimate {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }

    async fn estimate_gas(&self, call: CallRequest) -> Result<u64, RelayError> {
        self.provider
            .estimate_gas(call)
            .await
            .map_err(|e| e.to_relay_error())
    }

    async fn broadcast(&self, envelope: &TxEnvelope) -> Result<B256, RelayError> {
        let encoded = envelope.encoded_2718();
        let pending = self
            .provider
            .send_raw_transaction(&encoded)
            .await
            .map_err(|e| e.to_relay_error())?;

        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, hash: B256) -> Result<Option<TransactionReceipt>, RelayError> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| e.to_relay_error())
    }

    async fn mempool_content(&self, address: Address) -> Result<MempoolContent, RelayError> {
        let content = self
            .provider
            .txpool_content_from(address)
            .await
            .map_err(|e| e.to_relay_error())?;

        Ok(MempoolContent {
            pending: content.pending.values().map(|tx| tx.tx_hash()).collect(),
            queued: content.queued.values().map(|tx| tx.tx_hash()).collect(),
        })
    }
}
