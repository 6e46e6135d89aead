//! Type conversion and formatting utilities.
//!
//! Functions for converting on-chain integer amounts into the decimal values
//! stored by the reward ledger.

use alloy::primitives::{hex, Address, U256};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Canonical storage form of an address (lowercase, 0x-prefixed).
///
/// Every address written to or looked up in the store goes through this so that
/// checksummed and lowercase inputs resolve to the same row.
pub fn address_key(address: &Address) -> String {
    hex_encode(address.as_slice())
}

// ============================================
// U256 Conversions
// ============================================

/// Convert U256 to f64 with decimal adjustment using BigDecimal for precision.
///
/// Returns 0.0 if the value cannot be represented as a finite f64.
///
/// # Example
/// ```ignore
/// let value = U256::from(1_500_000u64); // 1.5 USDC
/// let adjusted = u256_to_f64(value, 6); // Returns 1.5
/// ```
pub fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    u256_to_f64_safe(value, decimals).unwrap_or(0.0)
}

/// Convert U256 to f64 with decimal adjustment, returning Option for error handling.
fn u256_to_f64_safe(value: U256, decimals: u8) -> Option<f64> {
    // Convert U256 to BigDecimal via bytes (faster than string parsing)
    let bytes: [u8; 32] = value.to_le_bytes();
    let big_int = BigInt::from_bytes_le(num_bigint::Sign::Plus, &bytes);
    let big_value = BigDecimal::from(big_int);

    let adjusted = big_value / big_pow10(decimals);

    let result = adjusted.to_f64()?;

    if result.is_finite() {
        Some(result)
    } else {
        None
    }
}

// ============================================
// Rounding
// ============================================

/// Truncate `value` towards negative infinity at `decimals` fractional digits.
///
/// Share-pool rewards are floored, never rounded, so that the sum of all
/// payouts of a round can not exceed its points pool.
pub fn floor_to_decimals(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).floor() / scale
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_u256_to_f64_usdc_scale() {
        assert_eq!(u256_to_f64(U256::from(1_500_000u64), 6), 1.5);
        assert_eq!(u256_to_f64(U256::from(400_000_000u64), 6), 400.0);
        assert_eq!(u256_to_f64(U256::ZERO, 6), 0.0);
    }

    #[test]
    fn test_u256_to_f64_beyond_i64() {
        // 2^64, does not fit in a u64
        let raw = U256::from(18_446_744_073_709_551_616u128);
        let adjusted = u256_to_f64(raw, 6);
        assert!((adjusted - 18_446_744_073_709.551616).abs() < 1e-2);
    }

    #[test]
    fn test_floor_to_decimals() {
        assert_eq!(floor_to_decimals(100.0000005, 6), 100.0);
        assert_eq!(floor_to_decimals(33.3333339, 6), 33.333333);
        assert_eq!(floor_to_decimals(0.0, 6), 0.0);
    }

    #[test]
    fn test_address_key_is_lowercase() {
        let addr = address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc");
        assert_eq!(
            address_key(&addr),
            "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc"
        );
    }
}
