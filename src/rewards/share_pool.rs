use std::str::FromStr;

use alloy::primitives::Address;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use crate::{
    chain::{fetch_swap_logs, ChainClient},
    db::{
        models::{Campaign, SwapRecord, Task, TaskKind},
        RewardStore,
    },
    rewards::RewardError,
    utils::{address_key, floor_to_decimals, REWARD_DECIMALS},
    worker::decode_swap_logs,
};

/// Settle one expired share-pool round from chain data.
///
/// Volumes are recomputed from the round's own log window; the running
/// amounts written at ingest time are not read. Returns the number of users
/// whose progress was written.
pub(crate) async fn settle_task(
    store: &dyn RewardStore,
    chain: &dyn ChainClient,
    task: &Task,
    campaign: &Campaign,
    onboarding: &Task,
) -> Result<usize, RewardError> {
    let TaskKind::SharePool { points_pool } = task.kind else {
        return Ok(0);
    };

    let pool = Address::from_str(&campaign.pool_address)
        .map_err(|_| RewardError::InvalidPoolAddress(campaign.pool_address.clone()))?;

    let logs = fetch_swap_logs(
        chain,
        pool,
        task.start_time.max(0) as u64,
        task.end_time.max(0) as u64,
    )
    .await?;
    let swaps = decode_swap_logs(chain, &logs).await;
    debug!(
        "Task {}: {} logs, {} swaps in window",
        task.id,
        logs.len(),
        swaps.len()
    );

    let volumes = aggregate_volumes(&swaps);
    let (eligible, total) =
        select_eligible(store, volumes, onboarding.id, onboarding.onboarding_threshold()).await;

    if total <= 0.0 {
        info!("Task {} has no eligible volume, nothing to distribute", task.id);
        return Ok(0);
    }

    let mut rewarded = 0;
    for (sender, usdc) in eligible {
        let reward = floor_to_decimals(points_pool * (usdc / total), REWARD_DECIMALS);
        match write_reward(store, task, &sender, usdc, reward).await {
            Ok(()) => rewarded += 1,
            Err(e) => warn!(
                "Failed to write reward of {} for task {}: {}",
                sender, task.id, e
            ),
        }
    }

    info!(
        "Settled task {} of campaign {}: {} users, {} USDC",
        task.id, campaign.id, rewarded, total
    );
    Ok(rewarded)
}

/// Total USDC per sender.
fn aggregate_volumes(swaps: &[SwapRecord]) -> FxHashMap<Address, f64> {
    let mut volumes = FxHashMap::default();
    for swap in swaps {
        *volumes.entry(swap.sender).or_insert(0.0) += swap.usdc_amount;
    }
    volumes
}

/// Keep senders at or above `threshold`, and senders below it whose
/// onboarding task is already completed. Returns the kept senders keyed by
/// their canonical address and the sum of their volumes.
///
/// A sender whose onboarding state can not be read is dropped from both.
async fn select_eligible(
    store: &dyn RewardStore,
    volumes: FxHashMap<Address, f64>,
    onboarding_task_id: i64,
    threshold: f64,
) -> (Vec<(String, f64)>, f64) {
    let mut eligible = Vec::with_capacity(volumes.len());
    let mut total = 0.0;

    for (sender, usdc) in volumes {
        let key = address_key(&sender);
        if usdc >= threshold || onboarding_completed(store, &key, onboarding_task_id).await {
            total += usdc;
            eligible.push((key, usdc));
        }
    }

    (eligible, total)
}

async fn onboarding_completed(store: &dyn RewardStore, address: &str, task_id: i64) -> bool {
    let user = match store.get_user_by_address(address).await {
        Ok(Some(user)) => user,
        Ok(None) => return false,
        Err(e) => {
            warn!("Failed to get user {}: {}", address, e);
            return false;
        },
    };

    match store.get_user_task_progress(user.id, task_id).await {
        Ok(progress) => progress.is_some_and(|p| p.completed),
        Err(e) => {
            warn!(
                "Failed to get onboarding progress of user {}: {}",
                user.id, e
            );
            false
        },
    }
}

/// Overwrite the sender's progress on the round and log the points.
async fn write_reward(
    store: &dyn RewardStore,
    task: &Task,
    address: &str,
    usdc: f64,
    reward: f64,
) -> Result<(), RewardError> {
    let user_id = store.get_or_create_user(address).await?;
    let progress = match store.get_user_task_progress(user_id, task.id).await? {
        Some(progress) => progress,
        None => store.create_user_task_progress(user_id, task.id).await?,
    };

    store
        .update_user_task_progress(progress.id, true, usdc, reward)
        .await?;

    if reward > 0.0 {
        store
            .append_points_history(user_id, task.id, task.campaign_id, reward)
            .await?;
    }

    Ok(())
}
