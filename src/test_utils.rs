//! In-memory stand-ins for the chain and the store used by unit tests.

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    abis::V2Swap,
    chain::{ChainClient, ChainError, LogSubscription},
    db::{
        models::{
            Campaign, NewCampaign, NewTask, PointsHistoryEntry, SwapRecord, Task, TaskKind, User,
            UserTaskProgress,
        },
        DbError, RewardStore,
    },
};

// ==================== CHAIN ====================

/// `filter_logs` call as seen by [`FakeChain`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
    pub addresses: Vec<Address>,
    pub from_block: u64,
    pub to_block: u64,
}

/// Subscription lifecycle as seen by [`FakeChain`], in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Subscribed { id: usize, addresses: Vec<Address> },
    Unsubscribed { id: usize },
}

type ScriptedItems = VecDeque<Result<Log, ChainError>>;

#[derive(Default)]
struct FakeChainState {
    blocks: BTreeMap<u64, u64>,
    head: u64,
    head_requests: usize,
    filter_queries: Vec<FilterQuery>,
    logs: Vec<Log>,
    scripts: VecDeque<Result<ScriptedItems, ChainError>>,
    next_subscription: usize,
}

/// Scripted chain: a block time table, canned logs served by `filter_logs`
/// and a queue of subscription scripts.
///
/// A subscription replays its script then stays silent until it is dropped.
/// Once the queue is empty new subscriptions are silent from the start.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<FakeChainState>,
    events: Arc<Mutex<Vec<SubscriptionEvent>>>,
    events_changed: Arc<Notify>,
}

impl FakeChain {
    /// `(block_number, timestamp)` pairs; the head is the highest block.
    pub fn with_blocks(blocks: &[(u64, u64)]) -> Self {
        let chain = Self::default();
        {
            let mut state = chain.state.lock().unwrap();
            state.blocks = blocks.iter().copied().collect();
            state.head = blocks.iter().map(|(number, _)| *number).max().unwrap_or(0);
        }
        chain
    }

    /// Logs returned by `filter_logs` when address and block range match.
    pub fn add_logs(&self, logs: impl IntoIterator<Item = Log>) {
        self.state.lock().unwrap().logs.extend(logs);
    }

    pub fn script_subscription(&self, items: Vec<Result<Log, ChainError>>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .push_back(Ok(items.into_iter().collect()));
    }

    pub fn fail_next_subscribe(&self, error: ChainError) {
        self.state.lock().unwrap().scripts.push_back(Err(error));
    }

    pub fn head_requests(&self) -> usize {
        self.state.lock().unwrap().head_requests
    }

    pub fn filter_queries(&self) -> Vec<FilterQuery> {
        self.state.lock().unwrap().filter_queries.clone()
    }

    pub fn subscription_events(&self) -> Vec<SubscriptionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Wait until at least `count` subscription events were recorded.
    pub async fn wait_for_events(&self, count: usize) -> Vec<SubscriptionEvent> {
        loop {
            let notified = self.events_changed.notified();
            {
                let events = self.events.lock().unwrap();
                if events.len() >= count {
                    return events.clone();
                }
            }
            notified.await;
        }
    }

    fn record(&self, event: SubscriptionEvent) {
        self.events.lock().unwrap().push(event);
        self.events_changed.notify_waiters();
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .get(&block_number)
            .copied()
            .ok_or(ChainError::BlockNotFound(block_number))
    }

    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.head_requests += 1;
        Ok(state.head)
    }

    async fn filter_logs(
        &self,
        addresses: &[Address],
        topic: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.filter_queries.push(FilterQuery {
            addresses: addresses.to_vec(),
            from_block,
            to_block,
        });

        Ok(state
            .logs
            .iter()
            .filter(|log| addresses.contains(&log.address()))
            .filter(|log| log.topics().first() == Some(&topic))
            .filter(|log| {
                log.block_number
                    .is_some_and(|n| n >= from_block && n <= to_block)
            })
            .cloned()
            .collect())
    }

    async fn subscribe_logs(
        &self,
        addresses: &[Address],
        _topic: B256,
    ) -> Result<Box<dyn LogSubscription>, ChainError> {
        let (id, items) = {
            let mut state = self.state.lock().unwrap();
            let items = match state.scripts.pop_front() {
                Some(Ok(items)) => items,
                Some(Err(e)) => return Err(e),
                None => VecDeque::new(),
            };
            state.next_subscription += 1;
            (state.next_subscription, items)
        };

        let mut sorted = addresses.to_vec();
        sorted.sort();
        self.record(SubscriptionEvent::Subscribed {
            id,
            addresses: sorted,
        });

        Ok(Box::new(FakeSubscription {
            id,
            items,
            events: self.events.clone(),
            events_changed: self.events_changed.clone(),
        }))
    }
}

struct FakeSubscription {
    id: usize,
    items: ScriptedItems,
    events: Arc<Mutex<Vec<SubscriptionEvent>>>,
    events_changed: Arc<Notify>,
}

#[async_trait]
impl LogSubscription for FakeSubscription {
    async fn next(&mut self) -> Result<Log, ChainError> {
        match self.items.pop_front() {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn unsubscribe(self: Box<Self>) {
        self.events
            .lock()
            .unwrap()
            .push(SubscriptionEvent::Unsubscribed { id: self.id });
        self.events_changed.notify_waiters();
    }
}

/// Encoded `Swap` log with only the USDC (token0) legs set.
pub fn swap_log(
    pool: Address,
    sender: Address,
    amount0_in: u64,
    amount0_out: u64,
    block_number: u64,
    log_index: u64,
) -> Log {
    let event = V2Swap {
        sender,
        amount0In: U256::from(amount0_in),
        amount1In: U256::ZERO,
        amount0Out: U256::from(amount0_out),
        amount1Out: U256::ZERO,
        to: sender,
    };

    Log {
        inner: alloy::primitives::Log {
            address: pool,
            data: event.encode_log_data(),
        },
        block_hash: None,
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(B256::with_last_byte(block_number as u8)),
        transaction_index: None,
        log_index: Some(log_index),
        removed: false,
    }
}

/// USDC base units for a whole-dollar amount.
pub fn usdc(amount: u64) -> u64 {
    amount * 1_000_000
}

// ==================== STORE ====================

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    users: Vec<User>,
    campaigns: Vec<Campaign>,
    tasks: Vec<Task>,
    user_tasks: Vec<UserTaskProgress>,
    history: Vec<PointsHistoryEntry>,
    swaps: Vec<(i64, SwapRecord)>,
    failing_users: HashSet<String>,
    failing_campaign_reads: bool,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// [`RewardStore`] over plain vectors with the same conflict semantics as the
/// Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every user lookup for `address` fail.
    pub fn fail_user_lookup(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_users
            .insert(address.to_string());
    }

    /// Make every active-campaign read fail.
    pub fn fail_campaign_reads(&self) {
        self.state.lock().unwrap().failing_campaign_reads = true;
    }

    pub fn history(&self) -> Vec<PointsHistoryEntry> {
        self.state.lock().unwrap().history.clone()
    }

    pub fn progress(&self) -> Vec<UserTaskProgress> {
        self.state.lock().unwrap().user_tasks.clone()
    }

    pub fn swap_count(&self) -> usize {
        self.state.lock().unwrap().swaps.len()
    }

    pub fn user_id(&self, address: &str) -> Option<i64> {
        self.state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.address == address)
            .map(|u| u.id)
    }

    /// Seed a campaign with an onboarding task over its whole window and
    /// one share-pool task per `(start, end)` round. Returns the campaign id.
    pub async fn seed_campaign(
        &self,
        pool: &str,
        window: (i64, i64),
        onboarding: (f64, f64),
        points_pool: f64,
        rounds: &[(i64, i64)],
    ) -> i64 {
        let campaign_id = self
            .create_campaign(&NewCampaign {
                name: "test".to_string(),
                pool_address: pool.to_string(),
                start_time: window.0,
                end_time: window.1,
            })
            .await
            .unwrap();

        self.create_task(&NewTask {
            campaign_id,
            kind: TaskKind::Onboarding {
                reward: onboarding.0,
                threshold: onboarding.1,
            },
            description: "Onboarding".to_string(),
            start_time: window.0,
            end_time: window.1,
        })
        .await
        .unwrap();

        for (i, (start, end)) in rounds.iter().enumerate() {
            self.create_task(&NewTask {
                campaign_id,
                kind: TaskKind::SharePool { points_pool },
                description: format!("Round {}", i + 1),
                start_time: *start,
                end_time: *end,
            })
            .await
            .unwrap();
        }

        campaign_id
    }
}

#[async_trait]
impl RewardStore for MemoryStore {
    async fn get_active_campaign_pool_addresses(&self, now: i64) -> Result<Vec<String>, DbError> {
        let state = self.state.lock().unwrap();
        if state.failing_campaign_reads {
            return Err(DbError::InvalidRow("campaigns unavailable".to_string()));
        }
        let mut pools: Vec<String> = state
            .campaigns
            .iter()
            .filter(|c| c.contains(now))
            .map(|c| c.pool_address.clone())
            .collect();
        pools.sort();
        pools.dedup();
        Ok(pools)
    }

    async fn get_campaigns_by_pool_address(&self, pool: &str) -> Result<Vec<Campaign>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .campaigns
            .iter()
            .filter(|c| c.pool_address == pool)
            .cloned()
            .collect())
    }

    async fn get_campaign(&self, campaign_id: i64) -> Result<Option<Campaign>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state.campaigns.iter().find(|c| c.id == campaign_id).cloned())
    }

    async fn create_campaign(&self, campaign: &NewCampaign) -> Result<i64, DbError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.campaigns.push(Campaign {
            id,
            name: campaign.name.clone(),
            pool_address: campaign.pool_address.clone(),
            start_time: campaign.start_time,
            end_time: campaign.end_time,
        });
        Ok(id)
    }

    async fn create_task(&self, task: &NewTask) -> Result<i64, DbError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.tasks.push(Task {
            id,
            campaign_id: task.campaign_id,
            kind: task.kind,
            description: task.description.clone(),
            start_time: task.start_time,
            end_time: task.end_time,
        });
        Ok(id)
    }

    async fn get_onboarding_task(&self, campaign_id: i64) -> Result<Option<Task>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .iter()
            .find(|t| t.campaign_id == campaign_id && !t.is_share_pool())
            .cloned())
    }

    async fn get_campaign_tasks(&self, campaign_id: i64) -> Result<Vec<Task>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn get_active_tasks(&self, campaign_id: i64, at: i64) -> Result<Vec<Task>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.campaign_id == campaign_id && t.start_time < at && t.end_time > at)
            .cloned()
            .collect())
    }

    async fn get_tasks_by_ids(&self, task_ids: &[i64]) -> Result<Vec<Task>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .iter()
            .filter(|t| task_ids.contains(&t.id))
            .cloned()
            .collect())
    }

    async fn get_expired_share_pool_tasks(
        &self,
        now: i64,
        since: i64,
    ) -> Result<Vec<Task>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.is_share_pool() && t.end_time > since && t.end_time <= now)
            .cloned()
            .collect())
    }

    async fn get_or_create_user(&self, address: &str) -> Result<i64, DbError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_users.contains(address) {
            return Err(DbError::InvalidRow(format!("user {} unavailable", address)));
        }
        if let Some(user) = state.users.iter().find(|u| u.address == address) {
            return Ok(user.id);
        }
        let id = state.next_id();
        state.users.push(User {
            id,
            address: address.to_string(),
            created_at: 0,
        });
        Ok(id)
    }

    async fn get_user_by_address(&self, address: &str) -> Result<Option<User>, DbError> {
        let state = self.state.lock().unwrap();
        if state.failing_users.contains(address) {
            return Err(DbError::InvalidRow(format!("user {} unavailable", address)));
        }
        Ok(state.users.iter().find(|u| u.address == address).cloned())
    }

    async fn get_user_task_progress(
        &self,
        user_id: i64,
        task_id: i64,
    ) -> Result<Option<UserTaskProgress>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .user_tasks
            .iter()
            .find(|p| p.user_id == user_id && p.task_id == task_id)
            .cloned())
    }

    async fn create_user_task_progress(
        &self,
        user_id: i64,
        task_id: i64,
    ) -> Result<UserTaskProgress, DbError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .user_tasks
            .iter()
            .find(|p| p.user_id == user_id && p.task_id == task_id)
        {
            return Ok(existing.clone());
        }
        let progress = UserTaskProgress {
            id: state.next_id(),
            user_id,
            task_id,
            completed: false,
            amount: 0.0,
            points: 0.0,
        };
        state.user_tasks.push(progress.clone());
        Ok(progress)
    }

    async fn update_user_task_progress(
        &self,
        user_task_id: i64,
        completed: bool,
        amount: f64,
        points: f64,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        if let Some(progress) = state.user_tasks.iter_mut().find(|p| p.id == user_task_id) {
            progress.completed = completed;
            progress.amount = amount;
            progress.points = points;
        }
        Ok(())
    }

    async fn increment_user_task_amount(
        &self,
        task_id: i64,
        user_id: i64,
        delta: f64,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        if let Some(progress) = state
            .user_tasks
            .iter_mut()
            .find(|p| p.user_id == user_id && p.task_id == task_id)
        {
            progress.amount += delta;
            return Ok(());
        }
        let id = state.next_id();
        state.user_tasks.push(UserTaskProgress {
            id,
            user_id,
            task_id,
            completed: false,
            amount: delta,
            points: 0.0,
        });
        Ok(())
    }

    async fn get_user_tasks(&self, user_id: i64) -> Result<Vec<UserTaskProgress>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .user_tasks
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn append_points_history(
        &self,
        user_id: i64,
        task_id: i64,
        campaign_id: i64,
        points: f64,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.history.push(PointsHistoryEntry {
            id,
            user_id,
            task_id,
            campaign_id,
            points,
            created_at: id,
        });
        Ok(())
    }

    async fn get_points_history(&self, user_id: i64) -> Result<Vec<PointsHistoryEntry>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .history
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_swap_event(&self, user_id: i64, swap: &SwapRecord) -> Result<bool, DbError> {
        let mut state = self.state.lock().unwrap();
        if state
            .swaps
            .iter()
            .any(|(_, s)| s.tx_hash == swap.tx_hash && s.log_index == swap.log_index)
        {
            return Ok(false);
        }
        state.swaps.push((user_id, swap.clone()));
        Ok(true)
    }
}
