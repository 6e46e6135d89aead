#[allow(clippy::module_inception)]
mod config;

pub use self::config::{
    ChainSettings, ListenerSettings, PostgresSettings, RewardSettings, ServerSettings, Settings,
};
