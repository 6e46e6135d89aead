use std::time::Duration;

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, B256},
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    pubsub::Subscription,
    rpc::types::{Filter, Log},
};
use async_trait::async_trait;
use log::{debug, info, warn};
use moka::future::Cache;
use url::Url;

use crate::{
    chain::{ChainClient, ChainError, LogSubscription},
    config::ChainSettings,
};

/// [`ChainClient`] backed by an alloy websocket provider.
///
/// Block timestamps are cached: a block number that has been returned by the
/// node once is treated as final.
#[derive(Clone)]
pub struct AlloyChain {
    provider: DynProvider,
    block_times: Cache<u64, u64>,
}

impl AlloyChain {
    pub async fn connect(settings: &ChainSettings) -> Result<Self, ChainError> {
        let endpoint = Url::parse(&settings.ws_url)
            .map_err(|e| ChainError::Connect(format!("invalid ws_url: {}", e)))?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(ChainError::Connect(format!(
                "ws_url must use ws:// or wss://, got {}://",
                endpoint.scheme()
            )));
        }

        info!("Connecting to chain endpoint {}", endpoint.host_str().unwrap_or_default());

        let ws = WsConnect::new(endpoint.to_string());
        let provider = ProviderBuilder::new()
            .connect_ws(ws)
            .await
            .map_err(|e| ChainError::Connect(e.to_string()))?;

        let block_times = Cache::builder()
            .max_capacity(settings.block_cache_capacity)
            .time_to_idle(Duration::from_secs(3600))
            .build();

        info!("Connected to chain endpoint");

        Ok(Self {
            provider: DynProvider::new(provider),
            block_times,
        })
    }
}

#[async_trait]
impl ChainClient for AlloyChain {
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        if let Some(timestamp) = self.block_times.get(&block_number).await {
            return Ok(timestamp);
        }

        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .ok_or(ChainError::BlockNotFound(block_number))?;

        let timestamp = block.header.timestamp;
        self.block_times.insert(block_number, timestamp).await;

        Ok(timestamp)
    }

    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn filter_logs(
        &self,
        addresses: &[Address],
        topic: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainError> {
        let filter = Filter::new()
            .address(addresses.to_vec())
            .event_signature(topic)
            .from_block(from_block)
            .to_block(to_block);

        debug!(
            "eth_getLogs over {} address(es), blocks {}..={}",
            addresses.len(),
            from_block,
            to_block
        );

        self.provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn subscribe_logs(
        &self,
        addresses: &[Address],
        topic: B256,
    ) -> Result<Box<dyn LogSubscription>, ChainError> {
        let filter = Filter::new()
            .address(addresses.to_vec())
            .event_signature(topic);

        let subscription = self
            .provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| ChainError::Subscription(e.to_string()))?;

        Ok(Box::new(AlloyLogSubscription {
            provider: self.provider.clone(),
            subscription,
        }))
    }
}

struct AlloyLogSubscription {
    provider: DynProvider,
    subscription: Subscription<Log>,
}

#[async_trait]
impl LogSubscription for AlloyLogSubscription {
    async fn next(&mut self) -> Result<Log, ChainError> {
        self.subscription
            .recv()
            .await
            .map_err(|e| ChainError::Subscription(e.to_string()))
    }

    async fn unsubscribe(self: Box<Self>) {
        let id = *self.subscription.local_id();
        if let Err(e) = self.provider.unsubscribe(id).await {
            warn!("Failed to unsubscribe {}: {}", id, e);
        }
    }
}
