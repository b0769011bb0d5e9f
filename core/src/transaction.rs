use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One user-submitted intent: a single call the engine must land on chain.
///
/// Immutable once created. Gas parameters are optional; anything left unset
/// is resolved against the chain when the transaction is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    /// Caller-supplied correlation id; generated when omitted.
    #[serde(default = "new_message_id")]
    pub message_id: String,

    pub to: Address,

    #[serde(default)]
    pub value: U256,

    #[serde(default)]
    pub data: Bytes,

    /// Gas limit for the transaction.
    /// If not provided, the engine estimates it with a dry-run call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,

    /// Maximum fee per gas willing to pay (in wei).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<u128>,

    /// Maximum priority fee per gas willing to pay (in wei).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u128>,
}

impl TxRequest {
    pub fn new(to: Address, value: U256, data: Bytes) -> Self {
        Self {
            message_id: new_message_id(),
            to,
            value,
            data,
            gas_limit: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_fees(mut self, max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        self.max_fee_per_gas = Some(max_fee_per_gas);
        self.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
        self
    }

    /// True if the request carries explicit fee parameters.
    pub fn has_explicit_fees(&self) -> bool {
        self.max_fee_per_gas.is_some() || self.max_priority_fee_per_gas.is_some()
    }
}
