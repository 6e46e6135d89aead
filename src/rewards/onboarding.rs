use log::{debug, info, warn};

use crate::{
    db::{
        models::{Campaign, SwapRecord, Task, TaskKind, UserTaskProgress},
        DbError, RewardStore,
    },
    utils::address_key,
};

/// What a swap did to the user's onboarding task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OnboardingOutcome {
    /// Amount accumulated, threshold not reached yet
    Progressed { amount: f64 },
    /// Threshold crossed by this swap, reward granted
    Completed { amount: f64, reward: f64 },
    /// Task was already completed, nothing written
    AlreadyCompleted,
    /// Campaign has no onboarding task
    NoTask,
}

/// Attribute one recorded swap to every campaign of its pool whose window
/// contains the swap.
///
/// Campaigns are independent: a failure on one is logged and the remaining
/// ones are still updated.
pub(crate) async fn apply_swap(
    store: &dyn RewardStore,
    user_id: i64,
    swap: &SwapRecord,
) -> Result<(), DbError> {
    let pool = address_key(&swap.pool_address);
    let campaigns = store.get_campaigns_by_pool_address(&pool).await?;

    for campaign in campaigns {
        if !campaign.contains(swap.timestamp) {
            continue;
        }

        match update_onboarding(store, &campaign, user_id, swap.usdc_amount).await {
            Ok(OnboardingOutcome::Completed { amount, reward }) => info!(
                "User {} completed onboarding of campaign {} ({} USDC, {} points)",
                user_id, campaign.id, amount, reward
            ),
            Ok(outcome) => debug!(
                "Onboarding of user {} on campaign {}: {:?}",
                user_id, campaign.id, outcome
            ),
            Err(e) => warn!(
                "Failed to update onboarding of user {} on campaign {}: {}",
                user_id, campaign.id, e
            ),
        }

        if let Err(e) =
            increment_share_pools(store, campaign.id, user_id, swap.usdc_amount, swap.timestamp)
                .await
        {
            warn!(
                "Failed to update share pool progress of user {} on campaign {}: {}",
                user_id, campaign.id, e
            );
        }
    }

    Ok(())
}

/// Add `usdc` to the user's onboarding amount and grant the reward the first
/// time the cumulative amount reaches the threshold.
///
/// A completed task is terminal: later swaps leave it untouched.
pub(crate) async fn update_onboarding(
    store: &dyn RewardStore,
    campaign: &Campaign,
    user_id: i64,
    usdc: f64,
) -> Result<OnboardingOutcome, DbError> {
    let Some(task) = store.get_onboarding_task(campaign.id).await? else {
        return Ok(OnboardingOutcome::NoTask);
    };
    let TaskKind::Onboarding { reward, threshold } = task.kind else {
        return Ok(OnboardingOutcome::NoTask);
    };

    let progress = match store.get_user_task_progress(user_id, task.id).await? {
        Some(progress) => progress,
        None => backfill_progress(store, campaign.id, user_id, &task).await?,
    };

    if progress.completed {
        return Ok(OnboardingOutcome::AlreadyCompleted);
    }

    let amount = progress.amount + usdc;
    if amount >= threshold {
        store
            .update_user_task_progress(progress.id, true, amount, reward)
            .await?;
        store
            .append_points_history(user_id, task.id, campaign.id, reward)
            .await?;
        Ok(OnboardingOutcome::Completed { amount, reward })
    } else {
        store
            .update_user_task_progress(progress.id, false, amount, 0.0)
            .await?;
        Ok(OnboardingOutcome::Progressed { amount })
    }
}

/// Create zero-valued progress rows for every task of the campaign and return
/// the onboarding one.
async fn backfill_progress(
    store: &dyn RewardStore,
    campaign_id: i64,
    user_id: i64,
    onboarding: &Task,
) -> Result<UserTaskProgress, DbError> {
    let mut onboarding_progress = None;

    for task in store.get_campaign_tasks(campaign_id).await? {
        match store.create_user_task_progress(user_id, task.id).await {
            Ok(progress) if task.id == onboarding.id => onboarding_progress = Some(progress),
            Ok(_) => {},
            Err(e) => warn!(
                "Failed to create progress of user {} on task {}: {}",
                user_id, task.id, e
            ),
        }
    }

    match onboarding_progress {
        Some(progress) => Ok(progress),
        None => store.create_user_task_progress(user_id, onboarding.id).await,
    }
}

/// Add `usdc` to the running amount of every share-pool round active at `at`.
///
/// Display value only, settlement recomputes from chain data.
pub(crate) async fn increment_share_pools(
    store: &dyn RewardStore,
    campaign_id: i64,
    user_id: i64,
    usdc: f64,
    at: i64,
) -> Result<usize, DbError> {
    let mut updated = 0;

    for task in store.get_active_tasks(campaign_id, at).await? {
        if !task.is_share_pool() {
            continue;
        }
        match store.increment_user_task_amount(task.id, user_id, usdc).await {
            Ok(()) => updated += 1,
            Err(e) => warn!(
                "Failed to increment amount of user {} on task {}: {}",
                user_id, task.id, e
            ),
        }
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryStore;

    const POOL: &str = "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc";

    async fn campaign(store: &MemoryStore) -> Campaign {
        let id = store
            .seed_campaign(POOL, (0, 10_000), (10.0, 100.0), 500.0, &[(0, 5_000)])
            .await;
        store.get_campaign(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_threshold_crossing_rewards_once() {
        let store = MemoryStore::new();
        let campaign = campaign(&store).await;
        let user = store.get_or_create_user("0xa1").await.unwrap();

        let first = update_onboarding(&store, &campaign, user, 60.0).await.unwrap();
        assert_eq!(first, OnboardingOutcome::Progressed { amount: 60.0 });
        assert!(store.history().is_empty());

        let second = update_onboarding(&store, &campaign, user, 50.0).await.unwrap();
        assert_eq!(
            second,
            OnboardingOutcome::Completed {
                amount: 110.0,
                reward: 10.0
            }
        );

        let third = update_onboarding(&store, &campaign, user, 30.0).await.unwrap();
        assert_eq!(third, OnboardingOutcome::AlreadyCompleted);

        let onboarding = store.get_onboarding_task(campaign.id).await.unwrap().unwrap();
        let progress = store
            .get_user_task_progress(user, onboarding.id)
            .await
            .unwrap()
            .unwrap();
        assert!(progress.completed);
        assert_eq!(progress.amount, 110.0);
        assert_eq!(progress.points, 10.0);

        let history = store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].points, 10.0);
        assert_eq!(history[0].task_id, onboarding.id);
    }

    #[tokio::test]
    async fn test_first_swap_backfills_every_task() {
        let store = MemoryStore::new();
        let campaign = campaign(&store).await;
        let user = store.get_or_create_user("0xa1").await.unwrap();

        update_onboarding(&store, &campaign, user, 1.0).await.unwrap();

        let tasks = store.get_campaign_tasks(campaign.id).await.unwrap();
        let progress = store.get_user_tasks(user).await.unwrap();
        assert_eq!(progress.len(), tasks.len());
    }

    #[tokio::test]
    async fn test_campaign_without_onboarding_task() {
        let store = MemoryStore::new();
        let campaign_id = store
            .create_campaign(&crate::db::models::NewCampaign {
                name: "bare".to_string(),
                pool_address: POOL.to_string(),
                start_time: 0,
                end_time: 10,
            })
            .await
            .unwrap();
        let campaign = store.get_campaign(campaign_id).await.unwrap().unwrap();

        let outcome = update_onboarding(&store, &campaign, 1, 500.0).await.unwrap();

        assert_eq!(outcome, OnboardingOutcome::NoTask);
        assert!(store.progress().is_empty());
    }

    #[tokio::test]
    async fn test_share_pool_increment_only_touches_active_rounds() {
        let store = MemoryStore::new();
        let campaign_id = store
            .seed_campaign(
                POOL,
                (0, 3_000),
                (10.0, 100.0),
                500.0,
                &[(0, 1_000), (1_000, 2_000), (2_000, 3_000)],
            )
            .await;

        let updated = increment_share_pools(&store, campaign_id, 7, 25.0, 1_500)
            .await
            .unwrap();

        assert_eq!(updated, 1);
        let progress = store.progress();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].amount, 25.0);
    }
}
