use serde::{Deserialize, Serialize};

/// Progress of one user on one task (PostgreSQL).
///
/// For onboarding tasks `completed` never flips back to false and `amount`
/// only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTaskProgress {
    pub id: i64,
    pub user_id: i64,
    pub task_id: i64,
    pub completed: bool,
    pub amount: f64,
    pub points: f64,
}
