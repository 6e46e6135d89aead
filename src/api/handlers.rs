use std::{collections::BTreeMap, str::FromStr, sync::Arc};

use alloy::primitives::Address;
use anyhow::anyhow;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use log::info;
use rustc_hash::FxHashMap;

use crate::{
    api::{
        dto::{
            CampaignStatus, CreateCampaignReq, CreateCampaignResp, MessageResp, PointsEntry,
            TaskStatus, UserPointsResp, UserQuery, UserTaskStatusResp,
        },
        AppError, AppState,
    },
    db::models::{Campaign, NewCampaign, NewTask, Task, TaskKind},
    utils::{address_key, parse_schedule},
};

pub async fn health() -> Json<MessageResp> {
    Json(MessageResp {
        message: "ok".to_string(),
    })
}

/// Validated campaign request.
struct CampaignPlan {
    campaign: NewCampaign,
    pool: Address,
    onboarding: TaskKind,
    share_pool: TaskKind,
    round_secs: i64,
    rounds: i64,
}

fn plan_campaign(req: CreateCampaignReq) -> Result<CampaignPlan, AppError> {
    let invalid = |msg: String| AppError::InvalidRequest(anyhow!(msg));

    if req.name.trim().is_empty() {
        return Err(invalid("name is required".to_string()));
    }
    let pool = Address::from_str(req.pool_address.trim())
        .map_err(|e| invalid(format!("invalid pool address {}: {}", req.pool_address, e)))?;
    if req.start_at < 0 {
        return Err(invalid("startAt must not be negative".to_string()));
    }
    if req.round < 1 {
        return Err(invalid("round must be at least 1".to_string()));
    }
    for (field, value) in [
        ("onboardingReward", req.onboarding_reward),
        ("onboardingThreshold", req.onboarding_threshold),
        ("pointPool", req.point_pool),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(format!("{} must be a non-negative number", field)));
        }
    }

    let schedule = parse_schedule(&req.schedule)
        .map_err(|e| invalid(format!("invalid schedule {:?}: {}", req.schedule, e)))?;
    let round_secs = i64::try_from(schedule.as_secs())
        .map_err(|_| invalid("schedule is too long".to_string()))?;
    let end_time = round_secs
        .checked_mul(req.round)
        .and_then(|length| length.checked_add(req.start_at))
        .ok_or_else(|| invalid("campaign end time overflows".to_string()))?;

    Ok(CampaignPlan {
        campaign: NewCampaign {
            name: req.name,
            pool_address: address_key(&pool),
            start_time: req.start_at,
            end_time,
        },
        pool,
        onboarding: TaskKind::Onboarding {
            reward: req.onboarding_reward,
            threshold: req.onboarding_threshold,
        },
        share_pool: TaskKind::SharePool {
            points_pool: req.point_pool,
        },
        round_secs,
        rounds: req.round,
    })
}

/// Create a campaign with its onboarding task and `round` consecutive
/// share-pool rounds. The pool is watched right away if the campaign is
/// already running.
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateCampaignReq>, JsonRejection>,
) -> Result<Json<CreateCampaignResp>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::InvalidRequest(anyhow!(e.body_text())))?;
    let plan = plan_campaign(req)?;
    let store = &state.store;

    let campaign_id = store.create_campaign(&plan.campaign).await?;

    store
        .create_task(&NewTask {
            campaign_id,
            kind: plan.onboarding,
            description: "Onboarding".to_string(),
            start_time: plan.campaign.start_time,
            end_time: plan.campaign.end_time,
        })
        .await?;

    let mut start_time = plan.campaign.start_time;
    for round in 1..=plan.rounds {
        let end_time = start_time + plan.round_secs;
        store
            .create_task(&NewTask {
                campaign_id,
                kind: plan.share_pool,
                description: format!("Round {}", round),
                start_time,
                end_time,
            })
            .await?;
        start_time = end_time;
    }

    let now = Utc::now().timestamp();
    if plan.campaign.start_time <= now && now <= plan.campaign.end_time {
        state.registry.add([plan.pool]);
    }

    info!(
        "Created campaign {} on pool {} with {} rounds",
        campaign_id, plan.campaign.pool_address, plan.rounds
    );

    Ok(Json(CreateCampaignResp {
        message: "Campaign and tasks created successfully".to_string(),
        campaign_id,
    }))
}

async fn resolve_user(state: &AppState, query: &UserQuery) -> Result<i64, AppError> {
    if let Some(user_id) = query.user_id.filter(|id| *id != 0) {
        return Ok(user_id);
    }

    let raw = query
        .user_address
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| AppError::InvalidRequest(anyhow!("userID or userAddress is required")))?;
    let address = Address::from_str(raw)
        .map_err(|e| AppError::InvalidRequest(anyhow!("invalid userAddress {}: {}", raw, e)))?;
    let key = address_key(&address);

    match state.store.get_user_by_address(&key).await? {
        Some(user) => Ok(user.id),
        None => Err(AppError::UserNotFound(key)),
    }
}

/// Cache campaigns looked up while building one response.
async fn campaign_of(
    state: &AppState,
    cache: &mut FxHashMap<i64, Campaign>,
    campaign_id: i64,
) -> Result<Campaign, AppError> {
    if let Some(campaign) = cache.get(&campaign_id) {
        return Ok(campaign.clone());
    }
    let campaign = state
        .store
        .get_campaign(campaign_id)
        .await?
        .ok_or_else(|| AppError::InternalErr(anyhow!("campaign {} not found", campaign_id)))?;
    cache.insert(campaign_id, campaign.clone());
    Ok(campaign)
}

pub async fn get_user_task_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserTaskStatusResp>, AppError> {
    let user_id = resolve_user(&state, &query).await?;

    let progress = state.store.get_user_tasks(user_id).await?;
    let task_ids: Vec<i64> = progress.iter().map(|p| p.task_id).collect();
    let tasks = state.store.get_tasks_by_ids(&task_ids).await?;
    let progress: FxHashMap<i64, _> = progress.into_iter().map(|p| (p.task_id, p)).collect();

    let mut cache = FxHashMap::default();
    let mut campaigns: BTreeMap<i64, CampaignStatus> = BTreeMap::new();

    for task in tasks {
        let campaign = campaign_of(&state, &mut cache, task.campaign_id).await?;
        let entry = campaigns
            .entry(campaign.id)
            .or_insert_with(|| CampaignStatus {
                campaign_id: campaign.id,
                name: campaign.name.clone(),
                pool_address: campaign.pool_address.clone(),
                start_time: campaign.start_time,
                end_time: campaign.end_time,
                tasks: Vec::new(),
            });

        let user_task = progress.get(&task.id);
        entry.tasks.push(TaskStatus {
            task_id: task.id,
            r#type: task.kind.type_str().to_string(),
            description: task.description,
            completed: user_task.is_some_and(|p| p.completed),
            amount: user_task.map_or(0.0, |p| p.amount),
            points: user_task.map_or(0.0, |p| p.points),
            start_time: task.start_time,
            end_time: task.end_time,
        });
    }

    Ok(Json(UserTaskStatusResp {
        campaigns: campaigns.into_values().collect(),
    }))
}

pub async fn get_user_points(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserPointsResp>, AppError> {
    let user_id = resolve_user(&state, &query).await?;

    let history = state.store.get_points_history(user_id).await?;
    let mut task_ids: Vec<i64> = history.iter().map(|h| h.task_id).collect();
    task_ids.sort_unstable();
    task_ids.dedup();
    let tasks: FxHashMap<i64, Task> = state
        .store
        .get_tasks_by_ids(&task_ids)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let mut cache = FxHashMap::default();
    let mut points_history = Vec::with_capacity(history.len());
    let mut total = 0.0;

    for entry in history {
        let campaign = campaign_of(&state, &mut cache, entry.campaign_id).await?;
        let task = tasks.get(&entry.task_id).ok_or_else(|| {
            AppError::InternalErr(anyhow!("task {} not found", entry.task_id))
        })?;

        total += entry.points;
        points_history.push(PointsEntry {
            campaign_id: campaign.id,
            campaign_name: campaign.name,
            pool_address: campaign.pool_address,
            task_id: task.id,
            task_type: task.kind.type_str().to_string(),
            description: task.description.clone(),
            points: entry.points,
            timestamp: DateTime::from_timestamp(entry.created_at, 0),
        });
    }

    Ok(Json(UserPointsResp {
        points_history,
        total,
    }))
}
