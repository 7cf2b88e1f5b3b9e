//! Native U256 arithmetic for liquidation math.
//!
//! All monetary values flow through as wei-scale integers: token amounts in
//! raw units, oracle rates in wei-per-whole-token (18 decimals), values in
//! ETH-equivalent wei. f64 is used only at the display/config boundary.

use alloy::primitives::{I256, U256};

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%).
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// Protocol sentinel for "no debt / infinite health" (max uint256).
pub const HF_INFINITY: U256 = U256::MAX;

/// Pre-computed powers of 10 for fast decimal conversion.
const POW10: [u128; 19] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (exact up to 10^18, computed beyond).
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if (exp as usize) < POW10.len() {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Convert a raw token amount to ETH-equivalent wei.
///
/// `rate` is the oracle price in wei per whole token (18 decimals):
/// result = amount * rate / 10^decimals
#[inline(always)]
pub fn token_to_eth(amount: U256, rate: U256, decimals: u8) -> U256 {
    if amount.is_zero() || rate.is_zero() {
        return U256::ZERO;
    }
    (amount * rate) / pow10(decimals)
}

/// Convert ETH-equivalent wei back to raw token units (floor).
///
/// result = amount_eth * 10^decimals / rate
#[inline(always)]
pub fn eth_to_token(amount_eth: U256, rate: U256, decimals: u8) -> U256 {
    if amount_eth.is_zero() || rate.is_zero() {
        return U256::ZERO;
    }
    (amount_eth * pow10(decimals)) / rate
}

/// Apply a liquidation-bonus multiplier given in basis points.
///
/// `bonus_bps` is the full multiplier (10750 = 107.5%):
/// result = value * bonus_bps / 10000
#[inline(always)]
pub fn apply_bonus(value: U256, bonus_bps: u32) -> U256 {
    (value * U256::from(bonus_bps)) / BPS_DENOMINATOR
}

/// Invert `apply_bonus` (floor): result = value * 10000 / bonus_bps.
#[inline(always)]
pub fn unapply_bonus(value: U256, bonus_bps: u32) -> U256 {
    if bonus_bps == 0 {
        return U256::ZERO;
    }
    (value * BPS_DENOMINATOR) / U256::from(bonus_bps)
}

/// Convert ETH-equivalent wei to f64 ether. Display and config only.
#[inline(always)]
pub fn wei_to_eth_f64(wei: U256) -> f64 {
    if wei <= U256::from(u128::MAX) {
        let value: u128 = wei.to();
        value as f64 / 1e18
    } else {
        let limbs = wei.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        (high + limbs[0] as f64) / 1e18
    }
}

/// Convert f64 ether (e.g. a configured profit floor) to wei.
#[inline(always)]
pub fn eth_f64_to_wei(value: f64) -> U256 {
    if value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18) as u128)
}

/// Parse a decimal wei string as stored in the database.
#[inline(always)]
pub fn parse_wei(s: &str) -> Option<U256> {
    U256::from_str_radix(s.trim(), 10).ok()
}

/// Parse a signed decimal wei string (estimated profit may be negative).
#[inline(always)]
pub fn parse_wei_signed(s: &str) -> Option<I256> {
    I256::from_dec_str(s.trim()).ok()
}

/// Widen an unsigned wei value into the signed domain.
#[inline(always)]
pub fn to_signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

/// Safe minimum of two U256 values.
#[inline(always)]
pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}
