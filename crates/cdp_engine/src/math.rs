//! Fixed-point arithmetic helpers - no unwrap, no panics
//!
//! All amounts are 18-decimal fixed point stored in `u128`. Products that can
//! leave the 128-bit range are widened to `U256` and narrowed back with
//! saturation.

use primitive_types::U256;

/// 1.0 in 18-decimal fixed point
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Rescaling constant applied to P whenever it would drop below this value
pub const SCALE_FACTOR: u128 = 1_000_000_000;

/// Precision used for the nominal (price-independent) collateral ratio
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

/// 100% collateral ratio
pub const ONE_HUNDRED_PCT: u128 = DECIMAL_PRECISION;

/// Add u128 with saturation at MAX
pub fn add_u128(a: u128, b: u128) -> u128 {
    a.saturating_add(b)
}

/// Minimum of two u128
pub fn min_u128(a: u128, b: u128) -> u128 {
    if a < b { a } else { b }
}

/// Narrow a U256 to u128, saturating at u128::MAX
pub fn u256_to_u128(x: U256) -> u128 {
    if x > U256::from(u128::MAX) {
        u128::MAX
    } else {
        x.low_u128()
    }
}

/// `a * b / denominator` with a 256-bit intermediate (returns 0 if denominator is 0)
pub fn mul_div(a: u128, b: u128, denominator: u128) -> u128 {
    if denominator == 0 {
        return 0;
    }
    let product = U256::from(a) * U256::from(b);
    u256_to_u128(product / U256::from(denominator))
}

/// Individual collateral ratio: coll * price / debt (u128::MAX when debt is 0)
pub fn compute_cr(collateral: u128, debt: u128, price: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    mul_div(collateral, price, debt)
}

/// Nominal collateral ratio: coll * 1e20 / debt (u128::MAX when debt is 0)
pub fn compute_nominal_cr(collateral: u128, debt: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    mul_div(collateral, NICR_PRECISION, debt)
}

/// Absolute difference, used by tolerance checks
pub fn abs_diff(a: u128, b: u128) -> u128 {
    if a > b { a - b } else { b - a }
}

/// Parse a human decimal string ("1.1", "200", "0.005") into 18-decimal fixed point
pub fn parse_decimal(s: &str) -> Option<u128> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac.len() > 18 {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut frac_value: u128 = if frac.is_empty() { 0 } else { frac.parse().ok()? };
    for _ in frac.len()..18 {
        frac_value = frac_value.checked_mul(10)?;
    }
    whole.checked_mul(DECIMAL_PRECISION)?.checked_add(frac_value)
}

/// Render an 18-decimal amount without trailing zeros ("6666.666666666666666666")
pub fn format_decimal(x: u128) -> String {
    let whole = x / DECIMAL_PRECISION;
    let frac = x % DECIMAL_PRECISION;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:018}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Serde adapter for 18-decimal amounts written as decimal strings
pub mod serde_decimal {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_decimal(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_decimal(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid decimal amount: {raw}")))
    }
}
