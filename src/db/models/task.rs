use serde::{Deserialize, Serialize};

/// Reward rule of a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// One-time reward once cumulative campaign volume reaches `threshold`.
    Onboarding { reward: f64, threshold: f64 },
    /// Round whose `points_pool` is split pro rata among eligible traders.
    SharePool { points_pool: f64 },
}

impl TaskKind {
    pub const ONBOARDING: &'static str = "onboarding";
    pub const SHARE_POOL: &'static str = "share_pool";

    pub fn type_str(&self) -> &'static str {
        match self {
            Self::Onboarding { .. } => Self::ONBOARDING,
            Self::SharePool { .. } => Self::SHARE_POOL,
        }
    }

    /// Rebuild a kind from its stored columns. Returns `None` for an unknown type.
    pub fn from_columns(
        task_type: &str,
        onboarding_reward: f64,
        onboarding_threshold: f64,
        points_pool: f64,
    ) -> Option<Self> {
        match task_type {
            Self::ONBOARDING => Some(Self::Onboarding {
                reward: onboarding_reward,
                threshold: onboarding_threshold,
            }),
            Self::SHARE_POOL => Some(Self::SharePool { points_pool }),
            _ => None,
        }
    }

    /// `(onboarding_reward, onboarding_threshold, points_pool)` column values.
    pub fn columns(&self) -> (f64, f64, f64) {
        match *self {
            Self::Onboarding { reward, threshold } => (reward, threshold, 0.0),
            Self::SharePool { points_pool } => (0.0, 0.0, points_pool),
        }
    }
}

/// Task of a campaign with its own time window (PostgreSQL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub campaign_id: i64,
    pub kind: TaskKind,
    pub description: String,
    pub start_time: i64,
    pub end_time: i64,
}

impl Task {
    pub fn is_share_pool(&self) -> bool {
        matches!(self.kind, TaskKind::SharePool { .. })
    }

    /// Onboarding threshold, zero for other kinds.
    pub fn onboarding_threshold(&self) -> f64 {
        match self.kind {
            TaskKind::Onboarding { threshold, .. } => threshold,
            TaskKind::SharePool { .. } => 0.0,
        }
    }
}

/// Task row to be inserted.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub campaign_id: i64,
    pub kind: TaskKind,
    pub description: String,
    pub start_time: i64,
    pub end_time: i64,
}
