//! Fixed-point rendering of integer minor units (wei, lamports, satoshi).
//!
//! All arithmetic is integer arithmetic on `u128`; floating point is never
//! used for amounts so 18-decimal assets keep full precision.

use crate::error::ProcessingError;

/// Fractional digits shown by [`format_value`].
pub const DEFAULT_DISPLAY_DECIMALS: u32 = 6;

const MAX_DECIMALS: u32 = 38;

/// Render `value` minor units with 6 fractional digits, truncating (not rounding).
pub fn format_value(value: u128, decimals: u32) -> String {
    format_units(value, decimals, DEFAULT_DISPLAY_DECIMALS)
}

/// Render `value` minor units of an asset with `decimals` decimals, keeping at
/// most `display_decimals` fractional digits.
pub fn format_units(value: u128, decimals: u32, display_decimals: u32) -> String {
    let decimals = decimals.min(MAX_DECIMALS);
    let divisor = 10u128.pow(decimals);
    let int_part = value / divisor;
    let frac_part = value % divisor;

    let shown = decimals.min(display_decimals) as usize;
    if shown == 0 {
        return int_part.to_string();
    }

    let frac = format!("{:0width$}", frac_part, width = decimals as usize);
    format!("{}.{}", int_part, &frac[..shown])
}

/// Parse a non-negative decimal string ("0.25", "3", "1e-3" is rejected) into
/// minor units. Digits beyond `decimals` are truncated.
pub fn parse_units(amount: &str, decimals: u32) -> Result<u128, ProcessingError> {
    let amount = amount.trim();
    let invalid = || ProcessingError::AmountParsing(format!("invalid decimal amount '{}'", amount));

    let (int_str, frac_str) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };
    if int_str.is_empty() && frac_str.is_empty() {
        return Err(invalid());
    }
    if !int_str.chars().all(|c| c.is_ascii_digit()) || !frac_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let decimals = decimals.min(MAX_DECIMALS);
    let scale = 10u128.pow(decimals);
    let int_value: u128 = if int_str.is_empty() {
        0
    } else {
        int_str.parse().map_err(|_| invalid())?
    };

    let mut frac: String = frac_str.chars().take(decimals as usize).collect();
    while frac.len() < decimals as usize {
        frac.push('0');
    }
    let frac_value: u128 = if frac.is_empty() { 0 } else { frac.parse().map_err(|_| invalid())? };

    int_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(|| ProcessingError::Overflow(format!("amount '{}' does not fit in u128", amount)))
}

/// Convert a configured `min_value` (whole coins) into minor units.
pub fn min_value_units(min_value: f64, decimals: u32) -> Result<u128, ProcessingError> {
    if !min_value.is_finite() || min_value < 0.0 {
        return Err(ProcessingError::AmountParsing(format!("invalid min_value {}", min_value)));
    }
    // f64's Display never uses exponent notation
    parse_units(&min_value.to_string(), decimals)
}

/// Parse a `0x`-prefixed hex quantity as returned by EVM JSON-RPC.
pub fn parse_hex_u128(hex_str: &str) -> Result<u128, ProcessingError> {
    let digits = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ProcessingError::AmountParsing(format!("Failed to parse hex '{}': {}", hex_str, e)))
}

pub fn parse_hex_u64(hex_str: &str) -> Result<u64, ProcessingError> {
    let digits = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProcessingError::BlockParsing(format!("Failed to parse hex '{}' to u64: {}", hex_str, e)))
}
