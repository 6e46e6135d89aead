use serde::{Deserialize, Serialize};

/// Time-boxed reward campaign over a single pool (PostgreSQL).
///
/// Swaps on `pool_address` are attributable while their block timestamp lies
/// in `[start_time, end_time]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub pool_address: String,
    pub start_time: i64,
    pub end_time: i64,
}

impl Campaign {
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start_time && timestamp <= self.end_time
    }
}

/// Campaign row to be inserted.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub pool_address: String,
    pub start_time: i64,
    pub end_time: i64,
}
