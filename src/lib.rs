pub mod abis;
pub mod api;
pub mod chain;
pub mod config;
pub mod cron;
pub mod db;
pub mod rewards;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod test_utils;

pub use crate::config::Settings;
pub use chain::{AlloyChain, WatchedAddresses};
pub use cron::CronScheduler;
pub use db::{PostgresClient, RewardStore};
pub use rewards::RewardEngine;
pub use worker::SwapListener;
