pub mod settle_share_pools;
pub mod sync_watched_pools;
