use alloy::primitives::{Address, address};

/// Canonical Multicall3 deployment, present at the same address on most
/// EVM chains.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Default interval between mempool/receipt polls while tracking.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default window for a broadcast transaction to show up in the mempool.
pub const DEFAULT_MEMPOOL_TIMEOUT_MS: u64 = 30_000;

/// Default window for a mempool-visible transaction to be mined.
pub const DEFAULT_RECEIPT_TIMEOUT_MS: u64 = 120_000;
