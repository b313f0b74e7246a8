//! Decimal string ⇄ smallest-unit conversion.
//!
//! Amounts cross the API boundary as human-readable decimal strings and are
//! scaled by `10^decimals` into `U256`. No floating point is involved.

use alloy::primitives::U256;

use crate::error::{AgentError, Result};

/// Decimals of the native currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// Largest decimals value accepted (`10^77` is the largest power of ten in a `U256`).
pub const MAX_DECIMALS: u8 = 77;

/// Parse a decimal string (e.g. `"1.5"`) into a `U256` with the given number of decimals.
///
/// `parse_units("1.5", 18)` → `1_500_000_000_000_000_000`.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    let invalid = |reason: &str| AgentError::Validation(format!("invalid amount '{amount}': {reason}"));

    if amount.is_empty() {
        return Err(invalid("amount cannot be empty"));
    }
    if amount.starts_with('-') {
        return Err(invalid("amount must not be negative"));
    }
    if decimals > MAX_DECIMALS {
        return Err(invalid("too many token decimals"));
    }

    let (integer, fractional) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };

    if integer.is_empty() && fractional.is_empty() {
        return Err(invalid("no digits"));
    }
    if !integer.chars().all(|c| c.is_ascii_digit())
        || !fractional.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid("only digits and a single '.' are allowed"));
    }
    if fractional.len() > decimals as usize {
        return Err(invalid(&format!(
            "too many decimal places: got {}, max {decimals}",
            fractional.len()
        )));
    }

    // Pad fractional part to `decimals` digits
    let padded = format!("{fractional:0<width$}", width = decimals as usize);
    let combined = format!("{integer}{padded}");

    let combined = combined.trim_start_matches('0');
    let combined = if combined.is_empty() { "0" } else { combined };

    U256::from_str_radix(combined, 10).map_err(|_| invalid("value does not fit in 256 bits"))
}

/// Convert a smallest-unit value to a decimal string with the given number of decimals.
///
/// Always renders a fractional part: `format_units(10^18, 18)` → `"1.0"`.
pub fn format_units(value: U256, decimals: u8) -> String {
    let s = value.to_string();
    let decimals = decimals as usize;

    let (integer_part, fractional_part) = if s.len() <= decimals {
        ("0".to_string(), format!("{s:0>decimals$}"))
    } else {
        let split = s.len() - decimals;
        (s[..split].to_string(), s[split..].to_string())
    };

    let fractional = fractional_part.trim_end_matches('0');
    if fractional.is_empty() {
        format!("{integer_part}.0")
    } else {
        format!("{integer_part}.{fractional}")
    }
}

/// `parse_units(amount, 18)`.
pub fn parse_ether(amount: &str) -> Result<U256> {
    parse_units(amount, NATIVE_DECIMALS)
}

/// `format_units(wei, 18)`.
pub fn format_ether(wei: U256) -> String {
    format_units(wei, NATIVE_DECIMALS)
}

/// Canonical spelling of a decimal amount: no leading zeros in the integer
/// part, no trailing zeros in the fractional part, at least one fractional digit.
///
/// `format_units(parse_units(a, d)?, d) == normalize_amount(a)` for every valid `a`.
pub fn normalize_amount(amount: &str) -> String {
    let amount = amount.trim();
    let (integer, fractional) = amount.split_once('.').unwrap_or((amount, ""));
    let integer = integer.trim_start_matches('0');
    let integer = if integer.is_empty() { "0" } else { integer };
    let fractional = fractional.trim_end_matches('0');
    if fractional.is_empty() {
        format!("{integer}.0")
    } else {
        format!("{integer}.{fractional}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units_one_ether() {
        let result = parse_units("1.0", 18).unwrap();
        assert_eq!(result, U256::from(1_000_000_000_000_000_000u64));
    }

    #[test]
    fn parse_units_fractional() {
        let result = parse_units("1.5", 18).unwrap();
        assert_eq!(result, U256::from(1_500_000_000_000_000_000u64));
    }

    #[test]
    fn parse_units_zero() {
        assert_eq!(parse_units("0", 18).unwrap(), U256::ZERO);
        assert_eq!(parse_units("0.0", 18).unwrap(), U256::ZERO);
    }

    #[test]
    fn parse_units_leading_dot() {
        assert_eq!(
            parse_units(".5", 18).unwrap(),
            U256::from(500_000_000_000_000_000u64)
        );
    }

    #[test]
    fn parse_units_no_decimal() {
        let result = parse_units("100", 18).unwrap();
        assert_eq!(
            result,
            U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64))
        );
    }

    #[test]
    fn parse_units_six_decimals() {
        assert_eq!(parse_units("1000.0", 6).unwrap(), U256::from(1_000_000_000u64));
    }

    #[test]
    fn parse_units_zero_decimals() {
        assert_eq!(parse_units("42", 0).unwrap(), U256::from(42u64));
        assert!(parse_units("42.1", 0).is_err());
    }

    #[test]
    fn parse_units_rejects_garbage() {
        for bad in ["", "  ", "-1", "1.2.3", "1e18", "abc", "0x10", ".", "1,5"] {
            let err = parse_units(bad, 18).unwrap_err();
            assert!(
                matches!(err, AgentError::Validation(_)),
                "expected validation error for {bad:?}"
            );
        }
    }

    #[test]
    fn parse_units_too_many_decimals() {
        assert!(parse_units("1.1234567", 6).is_err());
    }

    #[test]
    fn parse_units_overflow() {
        let huge = "9".repeat(100);
        assert!(parse_units(&huge, 18).is_err());
    }

    #[test]
    fn format_units_values() {
        assert_eq!(format_units(U256::from(1_000_000_000_000_000_000u64), 18), "1.0");
        assert_eq!(format_units(U256::from(1_500_000_000_000_000_000u64), 18), "1.5");
        assert_eq!(format_units(U256::ZERO, 18), "0.0");
        assert_eq!(format_units(U256::from(1_000_000u64), 18), "0.000000000001");
        assert_eq!(format_units(U256::from(1_000_000_000u64), 6), "1000.0");
        assert_eq!(format_units(U256::from(7u64), 0), "7.0");
    }

    #[test]
    fn ether_helpers() {
        let wei = parse_ether("2.25").unwrap();
        assert_eq!(format_ether(wei), "2.25");
    }

    #[test]
    fn round_trip_law() {
        let cases = [
            ("1", 18),
            ("1.50", 18),
            ("0.000000000000000001", 18),
            ("000123.4500", 6),
            ("100", 0),
            ("0", 2),
            ("115792089237316195423570985008687907853269984665640564039457.584007913129639935", 18),
        ];
        for (amount, decimals) in cases {
            let raw = parse_units(amount, decimals).unwrap();
            assert_eq!(
                format_units(raw, decimals),
                normalize_amount(amount),
                "round trip failed for {amount} @ {decimals}"
            );
        }
    }
}
