//! Timestamp to block resolution and historical swap log retrieval.

use std::cmp::Ordering;

use alloy::{primitives::Address, rpc::types::Log, sol_types::SolEvent};
use log::debug;

use crate::{
    abis::V2Swap,
    chain::{ChainClient, ChainError},
};

/// Find the last block whose timestamp does not exceed `target_time`.
///
/// Binary search over `[lower_hint, upper_hint]`. The lower bound defaults to
/// genesis and the upper bound to the current head, fetched once per call.
/// Block timestamps are assumed to be non-decreasing.
///
/// The search stops as soon as the midpoint collapses onto the lower bound,
/// so the answer may sit one block below the true boundary. A result of `0`
/// means the target precedes the searched range and must be read as "no
/// lower bound" rather than as a match on genesis.
///
/// Block lookup failures are returned as is; retrying is up to the caller.
pub async fn resolve_block_at<C>(
    chain: &C,
    target_time: u64,
    lower_hint: Option<u64>,
    upper_hint: Option<u64>,
) -> Result<u64, ChainError>
where
    C: ChainClient + ?Sized,
{
    let mut low = lower_hint.unwrap_or(0);
    let mut high = match upper_hint {
        Some(high) => high,
        None => chain.latest_block_number().await?,
    };

    while low <= high {
        let mid = low + (high - low) / 2;
        if mid == low {
            break;
        }

        let block_time = chain.block_timestamp(mid).await?;
        match block_time.cmp(&target_time) {
            Ordering::Equal => return Ok(mid),
            Ordering::Less => low = mid + 1,
            // mid > low >= 0 here, so this can not underflow
            Ordering::Greater => high = mid - 1,
        }
    }

    Ok(low.saturating_sub(1))
}

/// Fetch the swap logs `pool` emitted between two unix timestamps.
///
/// Logs are taken from the block after the one resolved for `start_time` up to
/// the block resolved for `end_time`, inclusive.
pub async fn fetch_swap_logs<C>(
    chain: &C,
    pool: Address,
    start_time: u64,
    end_time: u64,
) -> Result<Vec<Log>, ChainError>
where
    C: ChainClient + ?Sized,
{
    let start_block = resolve_block_at(chain, start_time, None, None).await?;
    let end_block = resolve_block_at(chain, end_time, Some(start_block), None).await?;

    if end_block <= start_block {
        debug!(
            "Empty block window for pool {} ({}..{})",
            pool, start_time, end_time
        );
        return Ok(Vec::new());
    }

    chain
        .filter_logs(&[pool], V2Swap::SIGNATURE_HASH, start_block + 1, end_block)
        .await
}
