//! Job to keep the watched pools in line with the running campaigns.
//!
//! Adds pools of campaigns that started and drops pools whose campaigns all
//! ended. The registry is only touched when something changed, so a steady
//! state never forces the listener to resubscribe.

use std::collections::HashSet;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use chrono::Utc;
use log::info;

use crate::{chain::WatchedAddresses, db::RewardStore, worker::listener::parse_addresses};

/// Registry changes applied by one run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PoolDiff {
    pub added: Vec<Address>,
    pub removed: Vec<Address>,
}

impl PoolDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub async fn run(store: &dyn RewardStore, registry: &WatchedAddresses) -> Result<PoolDiff> {
    let pools = store
        .get_active_campaign_pool_addresses(Utc::now().timestamp())
        .await
        .context("Failed to load active campaign pools")?;
    let active: HashSet<Address> = parse_addresses(&pools).into_iter().collect();

    let diff = diff(&registry.snapshot(), &active);
    if diff.is_empty() {
        return Ok(diff);
    }

    if !diff.added.is_empty() {
        registry.add(diff.added.iter().copied());
    }
    if !diff.removed.is_empty() {
        registry.remove(diff.removed.iter().copied());
    }

    info!(
        "Synced watched pools: {} added, {} removed",
        diff.added.len(),
        diff.removed.len()
    );
    Ok(diff)
}

fn diff(watched: &HashSet<Address>, active: &HashSet<Address>) -> PoolDiff {
    let mut added: Vec<Address> = active.difference(watched).copied().collect();
    let mut removed: Vec<Address> = watched.difference(active).copied().collect();
    added.sort();
    removed.sort();
    PoolDiff { added, removed }
}
