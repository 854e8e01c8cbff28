//! Fixed-point amount parsing and formatting.
//!
//! User-facing amounts are decimal strings; everything past this module is
//! integer liners. Parsing is done digit by digit so no floating point ever
//! touches a monetary value.

use crate::constants::{COIN, COIN_DECIMALS};
use crate::error::AmountError;

/// Fractional digits accepted for a fee rate given in liners per vbyte.
pub const FEE_RATE_DECIMALS: usize = 3;

/// Parse a coin amount such as `"1.5"` into liners.
///
/// # Examples
///
/// ```
/// use baseline_core::amount::parse_coins;
/// assert_eq!(parse_coins("1.5").unwrap(), 150_000_000);
/// assert_eq!(parse_coins("0.00000550").unwrap(), 550);
/// ```
pub fn parse_coins(input: &str) -> Result<u64, AmountError> {
    parse_fixed(input, COIN_DECIMALS)
}

/// Parse a fee rate in liners per vbyte into liners per kilobyte.
///
/// Mirrors `round(rate * 1000)` for inputs with at most three decimals.
pub fn parse_rate_per_vbyte(input: &str) -> Result<u64, AmountError> {
    parse_fixed(input, FEE_RATE_DECIMALS)
}

/// Format liners as a coin amount with all eight decimals.
pub fn format_coins(liners: u64) -> String {
    format!("{}.{:08}", liners / COIN, liners % COIN)
}

fn parse_fixed(input: &str, decimals: usize) -> Result<u64, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
        return Err(AmountError::InvalidFormat(s.to_string()));
    }
    if frac.len() > decimals {
        return Err(AmountError::TooPrecise { max: decimals });
    }

    let scale = 10u64.pow(decimals as u32);
    let mut value: u64 = 0;
    for b in whole.bytes() {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or(AmountError::Overflow)?;
    }
    value = value.checked_mul(scale).ok_or(AmountError::Overflow)?;

    let mut frac_value: u64 = 0;
    for (i, b) in frac.bytes().enumerate() {
        let place = 10u64.pow((decimals - 1 - i) as u32);
        frac_value += u64::from(b - b'0') * place;
    }
    value.checked_add(frac_value).ok_or(AmountError::Overflow)
}
