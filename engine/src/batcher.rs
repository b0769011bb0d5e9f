use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolCall,
};
use relay_core::transaction::TxRequest;

sol!(
    #[derive(Debug)]
    struct Call3Value {
        address target;
        bool allowFailure;
        uint256 value;
        bytes callData;
    }

    function aggregate3Value(Call3Value[] calldata calls) external payable;
);

/// One resolved call: either a single request verbatim, or a batch folded
/// into an aggregator invocation. Gas parameters stay optional here; the
/// factory fills whatever is missing from the chain.
#[derive(Debug, Clone)]
pub struct CallPlan {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl CallPlan {
    pub fn from_single(request: &TxRequest) -> Self {
        Self {
            to: request.to,
            value: request.value,
            data: request.data.clone(),
            gas_limit: request.gas_limit,
            max_fee_per_gas: request.max_fee_per_gas,
            max_priority_fee_per_gas: request.max_priority_fee_per_gas,
        }
    }
}

/// Fold several requests into one aggregator call.
///
/// Values are summed (the aggregator forwards each call's own value), gas
/// limits are summed only when every request carries one, and the first
/// request with explicit fee parameters decides them for the whole batch.
pub fn fold_requests(aggregator: Address, requests: &[TxRequest]) -> CallPlan {
    let calls: Vec<Call3Value> = requests
        .iter()
        .map(|request| Call3Value {
            target: request.to,
            allowFailure: false,
            value: request.value,
            callData: request.data.clone(),
        })
        .collect();

    let data: Bytes = aggregate3ValueCall { calls }.abi_encode().into();

    let value = requests
        .iter()
        .fold(U256::ZERO, |acc, request| acc + request.value);

    let gas_limit = requests
        .iter()
        .map(|request| request.gas_limit)
        .try_fold(0u64, |acc, limit| limit.map(|l| acc + l));

    let priced = requests.iter().find(|request| request.has_explicit_fees());

    CallPlan {
        to: aggregator,
        value,
        data,
        gas_limit,
        max_fee_per_gas: priced.and_then(|r| r.max_fee_per_gas),
        max_priority_fee_per_gas: priced.and_then(|r| r.max_priority_fee_per_gas),
    }
}
