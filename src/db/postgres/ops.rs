use async_trait::async_trait;
use chrono::Utc;
use log::error;
use tokio_postgres::Row;

use crate::db::models::{
    Campaign, NewCampaign, NewTask, PointsHistoryEntry, SwapRecord, Task, TaskKind, User,
    UserTaskProgress,
};
use crate::db::postgres::PostgresClient;
use crate::db::{DbError, RewardStore};
use crate::utils::{address_key, hex_encode};

const TASK_COLUMNS: &str = "task_id, campaign_id, type, description, onboarding_reward, \
     onboarding_threshold, points_pool, start_time, end_time";

const USER_TASK_COLUMNS: &str = "user_task_id, user_id, task_id, completed, amount, points";

#[async_trait]
impl RewardStore for PostgresClient {
    // ==================== CAMPAIGNS ====================

    async fn get_active_campaign_pool_addresses(&self, now: i64) -> Result<Vec<String>, DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT DISTINCT pool_address
            FROM rewards.campaigns
            WHERE start_time <= $1 AND end_time >= $1
        "#;

        let rows = client.query(query, &[&now]).await?;
        Ok(rows.iter().map(|row| row.get("pool_address")).collect())
    }

    async fn get_campaigns_by_pool_address(&self, pool: &str) -> Result<Vec<Campaign>, DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT campaign_id, name, pool_address, start_time, end_time
            FROM rewards.campaigns
            WHERE pool_address = $1
        "#;

        let rows = client.query(query, &[&pool]).await?;
        Ok(rows.iter().map(row_to_campaign).collect())
    }

    async fn get_campaign(&self, campaign_id: i64) -> Result<Option<Campaign>, DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT campaign_id, name, pool_address, start_time, end_time
            FROM rewards.campaigns
            WHERE campaign_id = $1
        "#;

        let row = client.query_opt(query, &[&campaign_id]).await?;
        Ok(row.as_ref().map(row_to_campaign))
    }

    async fn create_campaign(&self, campaign: &NewCampaign) -> Result<i64, DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO rewards.campaigns (name, pool_address, start_time, end_time, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING campaign_id
        "#;

        let row = client
            .query_one(
                query,
                &[
                    &campaign.name,
                    &campaign.pool_address,
                    &campaign.start_time,
                    &campaign.end_time,
                    &Utc::now().timestamp(),
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to insert campaign {}: {:?}", campaign.name, e);
                e
            })?;

        Ok(row.get("campaign_id"))
    }

    // ==================== TASKS ====================

    async fn create_task(&self, task: &NewTask) -> Result<i64, DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO rewards.tasks (
                campaign_id, type, description, onboarding_reward, onboarding_threshold,
                points_pool, start_time, end_time, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING task_id
        "#;

        let (onboarding_reward, onboarding_threshold, points_pool) = task.kind.columns();
        let row = client
            .query_one(
                query,
                &[
                    &task.campaign_id,
                    &task.kind.type_str(),
                    &task.description,
                    &onboarding_reward,
                    &onboarding_threshold,
                    &points_pool,
                    &task.start_time,
                    &task.end_time,
                    &Utc::now().timestamp(),
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to insert {} task for campaign {}: {:?}",
                    task.kind.type_str(),
                    task.campaign_id,
                    e
                );
                e
            })?;

        Ok(row.get("task_id"))
    }

    async fn get_onboarding_task(&self, campaign_id: i64) -> Result<Option<Task>, DbError> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM rewards.tasks WHERE campaign_id = $1 AND type = $2 \
             ORDER BY task_id LIMIT 1",
            TASK_COLUMNS
        );

        let row = client
            .query_opt(&query, &[&campaign_id, &TaskKind::ONBOARDING])
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn get_campaign_tasks(&self, campaign_id: i64) -> Result<Vec<Task>, DbError> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM rewards.tasks WHERE campaign_id = $1 ORDER BY task_id",
            TASK_COLUMNS
        );

        let rows = client.query(&query, &[&campaign_id]).await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn get_active_tasks(&self, campaign_id: i64, at: i64) -> Result<Vec<Task>, DbError> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM rewards.tasks \
             WHERE campaign_id = $1 AND start_time < $2 AND end_time > $2 \
             ORDER BY task_id",
            TASK_COLUMNS
        );

        let rows = client.query(&query, &[&campaign_id, &at]).await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn get_tasks_by_ids(&self, task_ids: &[i64]) -> Result<Vec<Task>, DbError> {
        if task_ids.is_empty() {
            return Ok(vec![]);
        }

        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM rewards.tasks WHERE task_id = ANY($1) ORDER BY task_id",
            TASK_COLUMNS
        );

        let rows = client.query(&query, &[&task_ids]).await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn get_expired_share_pool_tasks(
        &self,
        now: i64,
        since: i64,
    ) -> Result<Vec<Task>, DbError> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM rewards.tasks \
             WHERE type = $1 AND end_time > $2 AND end_time <= $3 \
             ORDER BY end_time, task_id",
            TASK_COLUMNS
        );

        let rows = client
            .query(&query, &[&TaskKind::SHARE_POOL, &since, &now])
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    // ==================== USERS ====================

    async fn get_or_create_user(&self, address: &str) -> Result<i64, DbError> {
        let client = self.pool.get().await?;
        // The no-op update makes RETURNING yield the existing row on conflict
        let query = r#"
            INSERT INTO rewards.users (address, created_at)
            VALUES ($1, $2)
            ON CONFLICT (address) DO UPDATE SET address = EXCLUDED.address
            RETURNING user_id
        "#;

        let row = client
            .query_one(query, &[&address, &Utc::now().timestamp()])
            .await?;
        Ok(row.get("user_id"))
    }

    async fn get_user_by_address(&self, address: &str) -> Result<Option<User>, DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT user_id, address, created_at
            FROM rewards.users
            WHERE address = $1
        "#;

        let row = client.query_opt(query, &[&address]).await?;
        Ok(row.map(|row| User {
            id: row.get("user_id"),
            address: row.get("address"),
            created_at: row.get("created_at"),
        }))
    }

    // ==================== USER TASKS ====================

    async fn get_user_task_progress(
        &self,
        user_id: i64,
        task_id: i64,
    ) -> Result<Option<UserTaskProgress>, DbError> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM rewards.user_tasks WHERE user_id = $1 AND task_id = $2",
            USER_TASK_COLUMNS
        );

        let row = client.query_opt(&query, &[&user_id, &task_id]).await?;
        Ok(row.as_ref().map(row_to_user_task))
    }

    async fn create_user_task_progress(
        &self,
        user_id: i64,
        task_id: i64,
    ) -> Result<UserTaskProgress, DbError> {
        let client = self.pool.get().await?;
        let query = format!(
            "INSERT INTO rewards.user_tasks (user_id, task_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $3) \
             ON CONFLICT (user_id, task_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING {}",
            USER_TASK_COLUMNS
        );

        let row = client
            .query_one(&query, &[&user_id, &task_id, &Utc::now().timestamp()])
            .await?;
        Ok(row_to_user_task(&row))
    }

    async fn update_user_task_progress(
        &self,
        user_task_id: i64,
        completed: bool,
        amount: f64,
        points: f64,
    ) -> Result<(), DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            UPDATE rewards.user_tasks
            SET completed = $2, amount = $3, points = $4, updated_at = $5
            WHERE user_task_id = $1
        "#;

        client
            .execute(
                query,
                &[
                    &user_task_id,
                    &completed,
                    &amount,
                    &points,
                    &Utc::now().timestamp(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn increment_user_task_amount(
        &self,
        task_id: i64,
        user_id: i64,
        delta: f64,
    ) -> Result<(), DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO rewards.user_tasks (user_id, task_id, amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (user_id, task_id) DO UPDATE SET
                amount = rewards.user_tasks.amount + EXCLUDED.amount,
                updated_at = EXCLUDED.updated_at
        "#;

        client
            .execute(
                query,
                &[&user_id, &task_id, &delta, &Utc::now().timestamp()],
            )
            .await?;
        Ok(())
    }

    async fn get_user_tasks(&self, user_id: i64) -> Result<Vec<UserTaskProgress>, DbError> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM rewards.user_tasks WHERE user_id = $1 ORDER BY task_id",
            USER_TASK_COLUMNS
        );

        let rows = client.query(&query, &[&user_id]).await?;
        Ok(rows.iter().map(row_to_user_task).collect())
    }

    // ==================== POINTS HISTORY ====================

    async fn append_points_history(
        &self,
        user_id: i64,
        task_id: i64,
        campaign_id: i64,
        points: f64,
    ) -> Result<(), DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO rewards.user_points_history (user_id, task_id, campaign_id, points, created_at)
            VALUES ($1, $2, $3, $4, $5)
        "#;

        client
            .execute(
                query,
                &[
                    &user_id,
                    &task_id,
                    &campaign_id,
                    &points,
                    &Utc::now().timestamp(),
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to append {} points for user {} on task {}: {:?}",
                    points, user_id, task_id, e
                );
                e
            })?;
        Ok(())
    }

    async fn get_points_history(&self, user_id: i64) -> Result<Vec<PointsHistoryEntry>, DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT history_id, user_id, task_id, campaign_id, points, created_at
            FROM rewards.user_points_history
            WHERE user_id = $1
            ORDER BY created_at, history_id
        "#;

        let rows = client.query(query, &[&user_id]).await?;
        Ok(rows
            .iter()
            .map(|row| PointsHistoryEntry {
                id: row.get("history_id"),
                user_id: row.get("user_id"),
                task_id: row.get("task_id"),
                campaign_id: row.get("campaign_id"),
                points: row.get("points"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    // ==================== SWAPS ====================

    async fn insert_swap_event(&self, user_id: i64, swap: &SwapRecord) -> Result<bool, DbError> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO rewards.user_swaps (
                user_id, transaction_hash, log_index, block_number, pool_address,
                amount_usdc, swap_time, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (transaction_hash, log_index) DO NOTHING
        "#;

        let inserted = client
            .execute(
                query,
                &[
                    &user_id,
                    &hex_encode(swap.tx_hash.as_slice()),
                    &(swap.log_index as i64),
                    &(swap.block_number as i64),
                    &address_key(&swap.pool_address),
                    &swap.usdc_amount,
                    &swap.timestamp,
                    &Utc::now().timestamp(),
                ],
            )
            .await?;

        Ok(inserted > 0)
    }
}

fn row_to_campaign(row: &Row) -> Campaign {
    Campaign {
        id: row.get("campaign_id"),
        name: row.get("name"),
        pool_address: row.get("pool_address"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
    }
}

fn row_to_task(row: &Row) -> Result<Task, DbError> {
    let task_id: i64 = row.get("task_id");
    let task_type: String = row.get("type");
    let kind = TaskKind::from_columns(
        &task_type,
        row.get("onboarding_reward"),
        row.get("onboarding_threshold"),
        row.get("points_pool"),
    )
    .ok_or_else(|| DbError::InvalidRow(format!("task {} has unknown type {}", task_id, task_type)))?;

    Ok(Task {
        id: task_id,
        campaign_id: row.get("campaign_id"),
        kind,
        description: row.get("description"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
    })
}

fn row_to_user_task(row: &Row) -> UserTaskProgress {
    UserTaskProgress {
        id: row.get("user_task_id"),
        user_id: row.get("user_id"),
        task_id: row.get("task_id"),
        completed: row.get("completed"),
        amount: row.get("amount"),
        points: row.get("points"),
    }
}
