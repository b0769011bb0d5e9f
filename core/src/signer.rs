use std::str::FromStr;

use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEnvelope},
    network::TxSigner,
    primitives::Address,
    signers::local::PrivateKeySigner,
};

use crate::error::RelayError;

/// Signing capability bound to one fixed sender address.
///
/// Uses the impl-Future pattern so implementations stay object-free; remote
/// key-management backends plug in behind the same seam.
pub trait TransactionSigner: Send + Sync + 'static {
    fn address(&self) -> Address;

    fn sign(
        &self,
        tx: TxEip1559,
    ) -> impl Future<Output = Result<TxEnvelope, RelayError>> + Send;
}

/// In-process signer over a raw private key.
#[derive(Clone)]
pub struct LocalTransactionSigner {
    inner: PrivateKeySigner,
}

impl LocalTransactionSigner {
    pub fn new(inner: PrivateKeySigner) -> Self {
        Self { inner }
    }

    pub fn from_hex_key(key: &str) -> Result<Self, RelayError> {
        let inner = PrivateKeySigner::from_str(key).map_err(|e| RelayError::SignerError {
            message: format!("invalid private key: {e}"),
        })?;
        Ok(Self { inner })
    }
}

impl TransactionSigner for LocalTransactionSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign(&self, mut tx: TxEip1559) -> Result<TxEnvelope, RelayError> {
        let signature = TxSigner::sign_transaction(&self.inner, &mut tx)
            .await
            .map_err(|e| RelayError::SignerError {
                message: e.to_string(),
            })?;

        Ok(TxEnvelope::Eip1559(tx.into_signed(signature)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, TxKind, U256};

    // Well-known anvil dev key.
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[tokio::test]
    async fn test_sign_produces_recoverable_envelope() {
        let signer = LocalTransactionSigner::from_hex_key(TEST_KEY).unwrap();

        let tx = TxEip1559 {
            chain_id: 1,
            nonce: 7,
            gas_limit: 21_000,
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
            to: TxKind::Call(Address::ZERO),
            value: U256::from(1u64),
            access_list: Default::default(),
            input: Bytes::new(),
        };

        let envelope = signer.sign(tx).await.unwrap();
        match envelope {
            TxEnvelope::Eip1559(signed) => {
                let recovered = signed.recover_signer().unwrap();
                assert_eq!(recovered, signer.address());
            }
            other => panic!("unexpected envelope variant: {other:?}"),
        }
    }

    #[test]
    fn test_from_hex_key_rejects_garbage() {
        assert!(LocalTransactionSigner::from_hex_key("not-a-key").is_err());
    }
}
