use async_trait::async_trait;
use thiserror::Error;

pub mod models;
pub mod postgres;

pub use postgres::PostgresClient;

use models::{
    Campaign, NewCampaign, NewTask, PointsHistoryEntry, SwapRecord, Task, User, UserTaskProgress,
};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("SQL error {0:?}")]
    Sql(#[from] tokio_postgres::Error),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("Error: {0}")]
    Error(#[from] anyhow::Error),
}

/// Persistence used by the reward engine and the HTTP API.
///
/// Addresses are passed in their canonical lowercase form
/// (see [`crate::utils::address_key`]). Every method is a single atomic store
/// operation; retrying is left to callers.
#[async_trait]
pub trait RewardStore: Send + Sync {
    // ==================== CAMPAIGNS ====================

    /// Distinct pools of campaigns running at `now`.
    async fn get_active_campaign_pool_addresses(&self, now: i64) -> Result<Vec<String>, DbError>;

    async fn get_campaigns_by_pool_address(&self, pool: &str) -> Result<Vec<Campaign>, DbError>;

    async fn get_campaign(&self, campaign_id: i64) -> Result<Option<Campaign>, DbError>;

    async fn create_campaign(&self, campaign: &NewCampaign) -> Result<i64, DbError>;

    // ==================== TASKS ====================

    async fn create_task(&self, task: &NewTask) -> Result<i64, DbError>;

    async fn get_onboarding_task(&self, campaign_id: i64) -> Result<Option<Task>, DbError>;

    /// Every task of the campaign regardless of its window.
    async fn get_campaign_tasks(&self, campaign_id: i64) -> Result<Vec<Task>, DbError>;

    /// Tasks of the campaign with `start_time < at < end_time`.
    async fn get_active_tasks(&self, campaign_id: i64, at: i64) -> Result<Vec<Task>, DbError>;

    async fn get_tasks_by_ids(&self, task_ids: &[i64]) -> Result<Vec<Task>, DbError>;

    /// Share-pool tasks with `since < end_time <= now`.
    async fn get_expired_share_pool_tasks(
        &self,
        now: i64,
        since: i64,
    ) -> Result<Vec<Task>, DbError>;

    // ==================== USERS ====================

    async fn get_or_create_user(&self, address: &str) -> Result<i64, DbError>;

    async fn get_user_by_address(&self, address: &str) -> Result<Option<User>, DbError>;

    // ==================== USER TASKS ====================

    async fn get_user_task_progress(
        &self,
        user_id: i64,
        task_id: i64,
    ) -> Result<Option<UserTaskProgress>, DbError>;

    /// Zero-valued progress row, or the existing one if the pair is already present.
    async fn create_user_task_progress(
        &self,
        user_id: i64,
        task_id: i64,
    ) -> Result<UserTaskProgress, DbError>;

    async fn update_user_task_progress(
        &self,
        user_task_id: i64,
        completed: bool,
        amount: f64,
        points: f64,
    ) -> Result<(), DbError>;

    /// Atomically add `delta` to the amount, creating the row if needed.
    async fn increment_user_task_amount(
        &self,
        task_id: i64,
        user_id: i64,
        delta: f64,
    ) -> Result<(), DbError>;

    async fn get_user_tasks(&self, user_id: i64) -> Result<Vec<UserTaskProgress>, DbError>;

    // ==================== POINTS HISTORY ====================

    async fn append_points_history(
        &self,
        user_id: i64,
        task_id: i64,
        campaign_id: i64,
        points: f64,
    ) -> Result<(), DbError>;

    async fn get_points_history(&self, user_id: i64) -> Result<Vec<PointsHistoryEntry>, DbError>;

    // ==================== SWAPS ====================

    /// Record a swap. Returns `false` if the same log was already recorded.
    async fn insert_swap_event(&self, user_id: i64, swap: &SwapRecord) -> Result<bool, DbError>;
}
