use serde::{Deserialize, Serialize};

/// Trader identified by address (PostgreSQL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Lowercase 0x-prefixed address
    pub address: String,
    pub created_at: i64,
}
