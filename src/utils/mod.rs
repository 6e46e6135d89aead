//! Utility functions for the swap reward service.
//!
//! - [`conversion`] - U256 scaling, address keys, reward flooring
//! - [`duration`] - campaign schedule parsing

mod conversion;
mod duration;

// ============================================
// Common Constants
// ============================================

/// Decimals of the USDC leg of monitored pools.
pub const USDC_DECIMALS: u8 = 6;

/// Fractional digits kept on share-pool rewards.
pub const REWARD_DECIMALS: i32 = 6;

// ============================================
// Re-exports
// ============================================

pub use conversion::{address_key, floor_to_decimals, hex_encode, u256_to_f64};
pub use duration::{parse_schedule, ScheduleError};
