use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignReq {
    pub name: String,
    pub pool_address: String,
    /// Unix seconds
    pub start_at: i64,
    pub onboarding_reward: f64,
    pub onboarding_threshold: f64,
    pub point_pool: f64,
    /// Length of one round, e.g. `7d` or `1h30m`
    pub schedule: String,
    pub round: i64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignResp {
    pub message: String,
    pub campaign_id: i64,
}

#[derive(Serialize, Debug)]
pub struct MessageResp {
    pub message: String,
}

/// Either a user id or an address identifies the user.
#[derive(Deserialize, Debug, Default)]
pub struct UserQuery {
    #[serde(rename = "userID")]
    pub user_id: Option<i64>,
    #[serde(rename = "userAddress")]
    pub user_address: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct UserTaskStatusResp {
    pub campaigns: Vec<CampaignStatus>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatus {
    pub campaign_id: i64,
    pub name: String,
    pub pool_address: String,
    pub start_time: i64,
    pub end_time: i64,
    pub tasks: Vec<TaskStatus>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_id: i64,
    pub r#type: String,
    pub description: String,
    pub completed: bool,
    pub amount: f64,
    pub points: f64,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserPointsResp {
    pub points_history: Vec<PointsEntry>,
    pub total: f64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PointsEntry {
    pub campaign_id: i64,
    pub campaign_name: String,
    pub pool_address: String,
    pub task_id: i64,
    pub task_type: String,
    pub description: String,
    pub points: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_campaign_request_is_camel_case() {
        let req: CreateCampaignReq = serde_json::from_value(json!({
            "name": "USDC/ETH",
            "poolAddress": "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc",
            "startAt": 1_700_000_000,
            "onboardingReward": 100.0,
            "onboardingThreshold": 1000.0,
            "pointPool": 10000.0,
            "schedule": "7d",
            "round": 4
        }))
        .unwrap();

        assert_eq!(req.start_at, 1_700_000_000);
        assert_eq!(req.point_pool, 10000.0);
        assert_eq!(req.round, 4);
    }

    #[test]
    fn test_user_query_field_names() {
        let query: UserQuery =
            serde_json::from_value(json!({ "userID": 3, "userAddress": "0xa1" })).unwrap();

        assert_eq!(query.user_id, Some(3));
        assert_eq!(query.user_address.as_deref(), Some("0xa1"));
    }

    #[test]
    fn test_task_status_serializes_type() {
        let status = TaskStatus {
            task_id: 1,
            r#type: "onboarding".to_string(),
            description: "Onboarding".to_string(),
            completed: false,
            amount: 0.0,
            points: 0.0,
            start_time: 0,
            end_time: 10,
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["type"], "onboarding");
        assert_eq!(value["taskId"], 1);
        assert_eq!(value["endTime"], 10);
    }
}
