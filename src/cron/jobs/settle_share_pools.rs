//! Job to settle share-pool rounds whose end time fell since the previous tick.

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;

use crate::rewards::{RewardEngine, SettlementReport};

/// Settles rounds with `now - interval < end_time <= now`.
///
/// The window is anchored on the wall clock, so a round whose end falls while
/// the service is down is not picked up by a later tick.
pub async fn run(engine: &RewardEngine, interval_secs: u64) -> Result<SettlementReport> {
    let now = Utc::now().timestamp();
    let since = now - interval_secs as i64;

    let start = std::time::Instant::now();
    let report = engine
        .run_settlement_tick(now, since)
        .await
        .context("Failed to load expired share pool tasks")?;

    if report.tasks > 0 {
        info!(
            "Completed settle_share_pools job in {:?} ({} tasks, {} failed, {} users rewarded)",
            start.elapsed(),
            report.tasks,
            report.failed,
            report.rewarded
        );
    }
    Ok(report)
}
