//! Reward attribution: incremental onboarding per swap and batch share-pool
//! settlement per expired round.

use thiserror::Error;

use crate::{chain::ChainError, db::DbError, worker::DecodeError};

mod engine;
mod onboarding;
mod share_pool;

pub use engine::{RewardEngine, SettlementReport};
pub use onboarding::OnboardingOutcome;

#[derive(Error, Debug)]
pub enum RewardError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("store error: {0}")]
    Db(#[from] DbError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("campaign {0} not found")]
    CampaignNotFound(i64),

    #[error("campaign {0} has no onboarding task")]
    MissingOnboardingTask(i64),

    #[error("invalid pool address {0}")]
    InvalidPoolAddress(String),
}
