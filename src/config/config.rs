use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Campaigns and their tasks
/// - Users and per-task progress
/// - Points history and recorded swaps
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Chain RPC configuration.
///
/// The endpoint must speak websockets, log subscriptions need pubsub.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub ws_url: String,
    /// Max block timestamps kept in memory
    #[serde(default = "default_block_cache_capacity")]
    pub block_cache_capacity: u64,
}

fn default_block_cache_capacity() -> u64 {
    10_000
}

/// Log subscription behaviour.
#[derive(Debug, Deserialize, Clone)]
pub struct ListenerSettings {
    /// First delay before resubscribing after a failure
    #[serde(default = "default_resubscribe_backoff_ms")]
    pub resubscribe_backoff_ms: u64,
    /// Upper bound of the doubling backoff
    #[serde(default = "default_max_resubscribe_backoff_ms")]
    pub max_resubscribe_backoff_ms: u64,
    /// How far back the first subscription back-fills. 0 disables it.
    #[serde(default)]
    pub catch_up_secs: u64,
}

fn default_resubscribe_backoff_ms() -> u64 {
    500
}

fn default_max_resubscribe_backoff_ms() -> u64 {
    30_000
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            resubscribe_backoff_ms: default_resubscribe_backoff_ms(),
            max_resubscribe_backoff_ms: default_max_resubscribe_backoff_ms(),
            catch_up_secs: 0,
        }
    }
}

/// Background reward jobs.
#[derive(Debug, Deserialize, Clone)]
pub struct RewardSettings {
    #[serde(default = "default_interval_secs")]
    pub settlement_interval_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub pool_sync_interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            settlement_interval_secs: default_interval_secs(),
            pool_sync_interval_secs: default_interval_secs(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, then overridden by `SWAP_REWARDS__*`
/// environment variables (e.g. `SWAP_REWARDS__POSTGRES__PASSWORD`).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub chain: ChainSettings,
    #[serde(default)]
    pub listener: ListenerSettings,
    #[serde(default)]
    pub rewards: RewardSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("SWAP_REWARDS").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
