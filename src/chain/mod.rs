//! Chain access for the reward engine.
//!
//! Everything that talks to the node goes through [`ChainClient`], so the
//! listener, the decoder and the settlement job can run against the alloy
//! provider in production and against a scripted chain in tests.

use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod block_time;
pub mod client;
pub mod registry;

pub use block_time::{fetch_swap_logs, resolve_block_at};
pub use client::AlloyChain;
pub use registry::WatchedAddresses;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("failed to connect to chain endpoint: {0}")]
    Connect(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("subscription error: {0}")]
    Subscription(String),
}

/// Read and subscribe access to an EVM chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Unix timestamp (seconds) of the given block.
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError>;

    async fn latest_block_number(&self) -> Result<u64, ChainError>;

    /// Logs emitted by `addresses` with topic-0 `topic` in `[from_block, to_block]`.
    async fn filter_logs(
        &self,
        addresses: &[Address],
        topic: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainError>;

    /// Open a live subscription for new logs matching `addresses` and `topic`.
    async fn subscribe_logs(
        &self,
        addresses: &[Address],
        topic: B256,
    ) -> Result<Box<dyn LogSubscription>, ChainError>;
}

/// A live log subscription owned by exactly one consumer.
#[async_trait]
pub trait LogSubscription: Send {
    /// Wait for the next log. An error means the subscription is dead and
    /// must be replaced.
    async fn next(&mut self) -> Result<Log, ChainError>;

    /// Tear the subscription down on the node side.
    async fn unsubscribe(self: Box<Self>);
}
