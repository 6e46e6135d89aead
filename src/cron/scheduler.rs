//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Settling share-pool rounds that just ended
//! - Syncing the watched pools with the running campaigns

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::{chain::WatchedAddresses, config::RewardSettings, rewards::RewardEngine};

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    engine: Arc<RewardEngine>,
    registry: Arc<WatchedAddresses>,
    settings: RewardSettings,
}

impl CronScheduler {
    pub fn new(
        engine: Arc<RewardEngine>,
        registry: Arc<WatchedAddresses>,
        settings: RewardSettings,
    ) -> Self {
        Self {
            engine,
            registry,
            settings,
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_settle_share_pools_job(&scheduler).await?;
        self.register_sync_watched_pools_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 2);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_settle_share_pools_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let engine = self.engine.clone();
        let interval = self.settings.settlement_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                if let Err(e) = jobs::settle_share_pools::run(&engine, interval).await {
                    error!("Failed to settle share pools: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered settle_share_pools job (every {}s)", interval);
        Ok(())
    }

    async fn register_sync_watched_pools_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let interval = self.settings.pool_sync_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let engine = engine.clone();
            let registry = registry.clone();
            Box::pin(async move {
                if let Err(e) =
                    jobs::sync_watched_pools::run(engine.store().as_ref(), &registry).await
                {
                    error!("Failed to sync watched pools: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered sync_watched_pools job (every {}s)", interval);
        Ok(())
    }
}
