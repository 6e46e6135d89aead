use serde::{Deserialize, Serialize};

/// Append-only record of points awarded (PostgreSQL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsHistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub task_id: i64,
    pub campaign_id: i64,
    pub points: f64,
    pub created_at: i64,
}
