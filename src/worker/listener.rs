use std::{str::FromStr, sync::Arc, time::Duration};

use alloy::{primitives::Address, rpc::types::Log, sol_types::SolEvent};
use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    abis::V2Swap,
    chain::{resolve_block_at, ChainClient, ChainError, LogSubscription, WatchedAddresses},
    config::ListenerSettings,
    rewards::RewardEngine,
};

/// Where a subscription epoch starts back-filling before it drains the live
/// stream.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CatchUp {
    None,
    FromBlock(u64),
    /// First block after this unix timestamp
    Since(u64),
}

/// Reported by an epoch worker to the control loop.
#[derive(Debug)]
enum WorkerEvent {
    SubscriptionError(ChainError),
}

/// Why a subscribed epoch ended.
#[derive(Debug)]
enum Transition {
    Shutdown,
    AddressesChanged,
    SubscriptionError(ChainError),
}

#[derive(Debug, Default, Clone, Copy)]
struct EpochStats {
    processed: usize,
    last_block: Option<u64>,
}

impl EpochStats {
    fn advance(&mut self, block: u64) {
        self.last_block = Some(self.last_block.map_or(block, |last| last.max(block)));
    }
}

/// Keeps exactly one log subscription open over the watched pools.
///
/// Two states: idle while the registry is empty (blocked on its change
/// notification), subscribed otherwise. A subscribed epoch ends on a registry
/// change, a subscription error or shutdown. Its worker unsubscribes and is
/// joined before the next epoch subscribes, so at most one subscription and
/// one worker exist at any time.
pub struct SwapListener {
    engine: Arc<RewardEngine>,
    registry: Arc<WatchedAddresses>,
    settings: ListenerSettings,
}

impl SwapListener {
    pub fn new(
        engine: Arc<RewardEngine>,
        registry: Arc<WatchedAddresses>,
        settings: ListenerSettings,
    ) -> Self {
        Self {
            engine,
            registry,
            settings,
        }
    }

    /// Add the pools of every currently running campaign to the registry.
    pub async fn seed_registry(&self) -> Result<usize> {
        let pools = self
            .engine
            .store()
            .get_active_campaign_pool_addresses(Utc::now().timestamp())
            .await
            .context("Failed to load active campaign pools")?;

        let addresses = parse_addresses(&pools);
        let count = addresses.len();
        if count > 0 {
            self.registry.add(addresses);
        }
        Ok(count)
    }

    pub async fn run(self, cancellation_token: CancellationToken) -> Result<()> {
        let seeded = self.seed_registry().await?;
        info!("Listener: seeded {} active campaign pools", seeded);

        let mut backoff = self.initial_backoff();
        let mut last_block: Option<u64> = None;
        let catch_up_since = match self.settings.catch_up_secs {
            0 => None,
            secs => Some((Utc::now().timestamp().max(0) as u64).saturating_sub(secs)),
        };

        loop {
            if cancellation_token.is_cancelled() {
                break;
            }

            // The snapshot below already reflects any pending change
            self.registry.take_pending_change();
            let snapshot = self.registry.snapshot();

            if snapshot.is_empty() {
                info!("Listener: no watched pools, idle until the registry changes");
                tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    _ = self.registry.changed() => continue,
                }
            }

            let mut addresses: Vec<Address> = snapshot.into_iter().collect();
            addresses.sort();

            let chain = self.engine.chain().clone();
            let subscription = match chain
                .subscribe_logs(&addresses, V2Swap::SIGNATURE_HASH)
                .await
            {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(
                        "Listener: failed to subscribe to {} pools: {}",
                        addresses.len(),
                        e
                    );
                    if !self.wait_before_retry(&cancellation_token, &mut backoff).await {
                        break;
                    }
                    continue;
                },
            };

            info!("Listener: subscribed to {} pools", addresses.len());

            let catch_up = match (last_block, catch_up_since) {
                // The last block may have been cut off mid-way, duplicates are skipped on ingest
                (Some(block), _) => CatchUp::FromBlock(block),
                (None, Some(since)) => CatchUp::Since(since),
                (None, None) => CatchUp::None,
            };

            let (events_tx, mut events_rx) = mpsc::channel(1);
            let worker = EpochWorker {
                chain,
                engine: self.engine.clone(),
                addresses,
                catch_up,
                events: events_tx,
            };
            let epoch_token = cancellation_token.child_token();
            let handle = tokio::spawn(worker.run(subscription, epoch_token.clone()));

            let transition = tokio::select! {
                _ = cancellation_token.cancelled() => Transition::Shutdown,
                _ = self.registry.changed() => Transition::AddressesChanged,
                event = events_rx.recv() => match event {
                    Some(WorkerEvent::SubscriptionError(e)) => Transition::SubscriptionError(e),
                    None => Transition::SubscriptionError(ChainError::Subscription(
                        "worker stopped unexpectedly".to_string(),
                    )),
                },
            };

            epoch_token.cancel();
            let stats = match handle.await {
                Ok(stats) => stats,
                Err(e) => {
                    error!("Listener: epoch worker panicked: {}", e);
                    EpochStats::default()
                },
            };

            if let Some(block) = stats.last_block {
                last_block = Some(last_block.map_or(block, |last| last.max(block)));
            }
            if stats.processed > 0 {
                backoff = self.initial_backoff();
            }

            match transition {
                Transition::Shutdown => break,
                Transition::AddressesChanged => {
                    info!("Listener: watched pools changed, resubscribing");
                },
                Transition::SubscriptionError(e) => {
                    warn!("Listener: subscription failed: {}", e);
                    if !self.wait_before_retry(&cancellation_token, &mut backoff).await {
                        break;
                    }
                },
            }
        }

        info!("Listener: stopped");
        Ok(())
    }

    fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.settings.resubscribe_backoff_ms)
    }

    /// Sleep for the current backoff or until the registry changes, then
    /// double the backoff. Returns `false` on shutdown.
    async fn wait_before_retry(
        &self,
        cancellation_token: &CancellationToken,
        backoff: &mut Duration,
    ) -> bool {
        let delay = *backoff;
        let max = Duration::from_millis(self.settings.max_resubscribe_backoff_ms);
        *backoff = (delay * 2).min(max);

        debug!("Listener: retrying in {:?}", delay);
        tokio::select! {
            _ = cancellation_token.cancelled() => false,
            _ = self.registry.changed() => true,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Drains one subscription: catch-up first, then live logs in delivery order.
struct EpochWorker {
    chain: Arc<dyn ChainClient>,
    engine: Arc<RewardEngine>,
    addresses: Vec<Address>,
    catch_up: CatchUp,
    events: mpsc::Sender<WorkerEvent>,
}

impl EpochWorker {
    async fn run(
        self,
        mut subscription: Box<dyn LogSubscription>,
        cancellation_token: CancellationToken,
    ) -> EpochStats {
        let mut stats = EpochStats::default();
        let result = self
            .drain(subscription.as_mut(), &cancellation_token, &mut stats)
            .await;

        subscription.unsubscribe().await;

        if let Err(e) = result {
            // The control loop keeps the receiver until this task is joined
            let _ = self.events.send(WorkerEvent::SubscriptionError(e)).await;
        }
        stats
    }

    async fn drain(
        &self,
        subscription: &mut dyn LogSubscription,
        cancellation_token: &CancellationToken,
        stats: &mut EpochStats,
    ) -> Result<(), ChainError> {
        tokio::select! {
            _ = cancellation_token.cancelled() => return Ok(()),
            result = self.catch_up(stats) => result?,
        }

        loop {
            let log = tokio::select! {
                _ = cancellation_token.cancelled() => return Ok(()),
                log = subscription.next() => log?,
            };
            self.handle(&log, stats).await;
        }
    }

    async fn catch_up(&self, stats: &mut EpochStats) -> Result<(), ChainError> {
        let from_block = match self.catch_up {
            CatchUp::None => return Ok(()),
            CatchUp::FromBlock(block) => block,
            CatchUp::Since(timestamp) => {
                resolve_block_at(self.chain.as_ref(), timestamp, None, None).await? + 1
            },
        };

        let head = self.chain.latest_block_number().await?;
        if from_block > head {
            return Ok(());
        }

        let logs = self
            .chain
            .filter_logs(&self.addresses, V2Swap::SIGNATURE_HASH, from_block, head)
            .await?;

        info!(
            "Listener: catching up {} logs in blocks {}..={}",
            logs.len(),
            from_block,
            head
        );

        for log in &logs {
            self.handle(log, stats).await;
        }
        stats.advance(head);

        Ok(())
    }

    async fn handle(&self, log: &Log, stats: &mut EpochStats) {
        stats.processed += 1;
        if let Some(block) = log.block_number {
            stats.advance(block);
        }

        if let Err(e) = self.engine.process_log(log).await {
            warn!(
                "Listener: skipping log {:?}#{:?}: {}",
                log.transaction_hash, log.log_index, e
            );
        }
    }
}

pub(crate) fn parse_addresses(addresses: &[String]) -> Vec<Address> {
    addresses
        .iter()
        .filter_map(|raw| match Address::from_str(raw) {
            Ok(address) => Some(address),
            Err(e) => {
                warn!("Ignoring invalid pool address {}: {}", raw, e);
                None
            },
        })
        .collect()
}
