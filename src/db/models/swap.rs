use alloy::primitives::{Address, B256};

/// Swap decoded from a pool `Swap` log.
///
/// Produced by the decoder and consumed straight away by the reward engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRecord {
    pub sender: Address,
    pub pool_address: Address,
    /// USDC leg of the swap, already scaled by the token decimals
    pub usdc_amount: f64,
    /// Block timestamp (unix seconds)
    pub timestamp: i64,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
}
