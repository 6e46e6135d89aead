use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use alloy::rpc::types::Log;
use log::{debug, error, info};
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use crate::{
    chain::ChainClient,
    db::{
        models::{Campaign, SwapRecord, Task},
        RewardStore,
    },
    rewards::{onboarding, share_pool, RewardError},
    utils::address_key,
    worker::decode_swap_log,
};

/// Outcome of one settlement tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettlementReport {
    /// Expired rounds found in the window
    pub tasks: usize,
    /// Rounds whose settlement failed and was skipped
    pub failed: usize,
    /// Progress rows written across all settled rounds
    pub rewarded: usize,
}

/// Per-user attribution locks.
///
/// An entry exists only while some attribution holds or waits on it, so two
/// tasks of the same user always share one mutex.
#[derive(Default)]
struct UserLocks {
    locks: StdMutex<FxHashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn acquire(&self, user_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(user_id).or_default().clone()
    }

    /// Drop the entry once no other task references it.
    fn release(&self, user_id: i64, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&user_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Turns swap logs into task progress and points.
///
/// Ingest is cheap: the swap is recorded and attribution is handed to a
/// background task, so the caller's log loop never waits on campaign updates.
/// Background updates of the same user run one at a time.
pub struct RewardEngine {
    store: Arc<dyn RewardStore>,
    chain: Arc<dyn ChainClient>,
    user_locks: Arc<UserLocks>,
    pending: TaskTracker,
}

impl RewardEngine {
    pub fn new(store: Arc<dyn RewardStore>, chain: Arc<dyn ChainClient>) -> Self {
        Self {
            store,
            chain,
            user_locks: Arc::new(UserLocks::default()),
            pending: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RewardStore> {
        &self.store
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    /// Decode and ingest one raw log. Returns `true` when a new swap was
    /// recorded, `false` for foreign logs and already recorded swaps.
    pub async fn process_log(&self, log: &Log) -> Result<bool, RewardError> {
        match decode_swap_log(self.chain.as_ref(), log).await? {
            Some(swap) => self.process_swap(swap).await,
            None => Ok(false),
        }
    }

    /// Record a decoded swap and schedule its attribution.
    pub async fn process_swap(&self, swap: SwapRecord) -> Result<bool, RewardError> {
        let sender = address_key(&swap.sender);
        let user_id = self.store.get_or_create_user(&sender).await?;

        if !self.store.insert_swap_event(user_id, &swap).await? {
            debug!(
                "Swap {}#{} already recorded, skipping",
                swap.tx_hash, swap.log_index
            );
            return Ok(false);
        }

        debug!(
            "Recorded swap: user {}, pool {}, {} USDC at {}",
            sender, swap.pool_address, swap.usdc_amount, swap.timestamp
        );

        let store = self.store.clone();
        let locks = self.user_locks.clone();
        let lock = locks.acquire(user_id);

        self.pending.spawn(async move {
            {
                let _guard = lock.lock().await;
                if let Err(e) = onboarding::apply_swap(store.as_ref(), user_id, &swap).await {
                    error!(
                        "Failed to attribute swap {} of user {}: {}",
                        swap.tx_hash, user_id, e
                    );
                }
            }
            locks.release(user_id, lock);
        });

        Ok(true)
    }

    /// Wait until every scheduled attribution has finished.
    pub async fn wait_for_pending(&self) {
        self.pending.close();
        self.pending.wait().await;
        self.pending.reopen();
    }

    /// Settle every share-pool round with `since < end_time <= now`.
    ///
    /// A round that fails is logged and skipped; it is not retried by a later
    /// tick unless its end time falls inside that tick's window again.
    pub async fn run_settlement_tick(
        &self,
        now: i64,
        since: i64,
    ) -> Result<SettlementReport, RewardError> {
        let tasks = self.store.get_expired_share_pool_tasks(now, since).await?;
        let mut report = SettlementReport {
            tasks: tasks.len(),
            ..Default::default()
        };

        if tasks.is_empty() {
            return Ok(report);
        }

        info!("Settling {} expired share pool tasks", tasks.len());

        let mut campaigns: FxHashMap<i64, Campaign> = FxHashMap::default();
        let mut onboarding_tasks: FxHashMap<i64, Task> = FxHashMap::default();

        for task in &tasks {
            match self
                .settle(task, &mut campaigns, &mut onboarding_tasks)
                .await
            {
                Ok(rewarded) => report.rewarded += rewarded,
                Err(e) => {
                    error!("Failed to settle task {}: {}", task.id, e);
                    report.failed += 1;
                },
            }
        }

        Ok(report)
    }

    async fn settle(
        &self,
        task: &Task,
        campaigns: &mut FxHashMap<i64, Campaign>,
        onboarding_tasks: &mut FxHashMap<i64, Task>,
    ) -> Result<usize, RewardError> {
        let campaign_id = task.campaign_id;

        let campaign = match campaigns.get(&campaign_id) {
            Some(campaign) => campaign.clone(),
            None => {
                let campaign = self
                    .store
                    .get_campaign(campaign_id)
                    .await?
                    .ok_or(RewardError::CampaignNotFound(campaign_id))?;
                campaigns.insert(campaign_id, campaign.clone());
                campaign
            },
        };

        let onboarding = match onboarding_tasks.get(&campaign_id) {
            Some(task) => task.clone(),
            None => {
                let onboarding = self
                    .store
                    .get_onboarding_task(campaign_id)
                    .await?
                    .ok_or(RewardError::MissingOnboardingTask(campaign_id))?;
                onboarding_tasks.insert(campaign_id, onboarding.clone());
                onboarding
            },
        };

        share_pool::settle_task(
            self.store.as_ref(),
            self.chain.as_ref(),
            task,
            &campaign,
            &onboarding,
        )
        .await
    }
}
