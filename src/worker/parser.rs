//! Swap log decoding.
//!
//! Turns raw pool logs into [`SwapRecord`]s. Logs of other events are skipped
//! silently so callers may pass a mixed stream; malformed swap logs are
//! reported per log and never abort a batch.

use alloy::{rpc::types::Log, sol_types::SolEvent};
use log::warn;
use thiserror::Error;

use crate::{
    abis::V2Swap,
    chain::{ChainClient, ChainError},
    db::models::SwapRecord,
    utils::{u256_to_f64, USDC_DECIMALS},
};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("ABI decode failed: {0}")]
    Abi(#[from] alloy::sol_types::Error),

    #[error("log has no block number")]
    MissingBlockNumber,

    #[error("log has no transaction hash")]
    MissingTxHash,

    #[error("swap has no positive USDC leg")]
    NoUsdcLeg,

    #[error("block timestamp lookup failed: {0}")]
    Timestamp(#[from] ChainError),
}

/// Decode a single log.
///
/// Returns `Ok(None)` for logs that are not a `Swap` (wrong topic-0 or topic
/// count) and for logs removed by a reorg.
///
/// The USDC leg is read from token0: `amount0In` when positive, otherwise
/// `amount0Out`. Pools are expected to list USDC as token0.
pub async fn decode_swap_log<C>(chain: &C, log: &Log) -> Result<Option<SwapRecord>, DecodeError>
where
    C: ChainClient + ?Sized,
{
    if log.removed {
        return Ok(None);
    }

    let topics = log.topics();
    if topics.len() != 3 || topics[0] != V2Swap::SIGNATURE_HASH {
        return Ok(None);
    }

    let event = V2Swap::decode_log_data(log.data())?;

    let usdc_leg = if !event.amount0In.is_zero() {
        event.amount0In
    } else if !event.amount0Out.is_zero() {
        event.amount0Out
    } else {
        return Err(DecodeError::NoUsdcLeg);
    };

    let block_number = log.block_number.ok_or(DecodeError::MissingBlockNumber)?;
    let tx_hash = log.transaction_hash.ok_or(DecodeError::MissingTxHash)?;

    let timestamp = match log.block_timestamp {
        Some(timestamp) => timestamp,
        None => chain.block_timestamp(block_number).await?,
    };

    Ok(Some(SwapRecord {
        sender: event.sender,
        pool_address: log.address(),
        usdc_amount: u256_to_f64(usdc_leg, USDC_DECIMALS),
        timestamp: timestamp as i64,
        tx_hash,
        block_number,
        log_index: log.log_index.unwrap_or_default(),
    }))
}

/// Decode a batch, dropping (and logging) every log that fails.
pub async fn decode_swap_logs<C>(chain: &C, logs: &[Log]) -> Vec<SwapRecord>
where
    C: ChainClient + ?Sized,
{
    let mut swaps = Vec::with_capacity(logs.len());

    for log in logs {
        match decode_swap_log(chain, log).await {
            Ok(Some(swap)) => swaps.push(swap),
            Ok(None) => {},
            Err(e) => warn!(
                "Skipping swap log {:?}#{:?}: {}",
                log.transaction_hash, log.log_index, e
            ),
        }
    }

    swaps
}
