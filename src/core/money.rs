//! Fixed-point money helpers.
//!
//! Amounts are `i64` cents everywhere inside the crate. Floats only appear at
//! the OCR boundary and strings at the Discord boundary; both are converted here.

use crate::errors::{Error, Result};

/// Cents in one dollar
pub const CENTS_PER_DOLLAR: i64 = 100;

/// Largest accepted line-item price ($99,999.00)
pub const MAX_ITEM_PRICE_CENTS: i64 = 99_999 * CENTS_PER_DOLLAR;

/// Largest accepted bill-level amount such as a subtotal or tip
pub const MAX_BILL_AMOUNT_CENTS: i64 = 999_999 * CENTS_PER_DOLLAR;

/// Converts a float dollar amount to cents, rounding half away from zero.
///
/// Returns `None` for NaN, infinities and values outside the `i64` range.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // range is checked before the cast
pub fn dollars_to_cents(amount: f64) -> Option<i64> {
    if !amount.is_finite() {
        return None;
    }
    let cents = (amount * 100.0).round();
    #[allow(clippy::cast_precision_loss)]
    let in_range = cents.abs() < i64::MAX as f64;
    in_range.then_some(cents as i64)
}

/// Rejects amounts that are negative or larger than [`MAX_BILL_AMOUNT_CENTS`].
pub fn check_bill_amount(cents: i64) -> Result<i64> {
    if cents < 0 || cents > MAX_BILL_AMOUNT_CENTS {
        return Err(Error::InvalidAmount { cents });
    }
    Ok(cents)
}

/// Parses a user-entered amount such as `12.34`, `$12`, or `0.5` into cents.
///
/// At most two decimal places are accepted. Negative amounts are rejected.
pub fn parse_amount(input: &str) -> Result<i64> {
    let invalid = || Error::InvalidInput {
        message: format!("'{input}' is not a valid amount"),
    };

    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed).replace(',', "");
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed.as_str(), ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
        || fraction.len() > 2
    {
        return Err(invalid());
    }

    let dollars: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };

    let total = dollars
        .checked_mul(CENTS_PER_DOLLAR)
        .and_then(|d| d.checked_add(cents))
        .ok_or_else(invalid)?;
    check_bill_amount(total)
}

/// Formats cents for display, e.g. `$12.34` or `-$0.05`.
#[must_use]
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollars_to_cents_rounds_half_away() {
        assert_eq!(dollars_to_cents(0.125), Some(13));
        assert_eq!(dollars_to_cents(-0.125), Some(-13));
        assert_eq!(dollars_to_cents(0.1 + 0.2), Some(30));
        assert_eq!(dollars_to_cents(24.97), Some(2497));
    }

    #[test]
    fn test_dollars_to_cents_rejects_non_finite() {
        assert_eq!(dollars_to_cents(f64::NAN), None);
        assert_eq!(dollars_to_cents(f64::INFINITY), None);
        assert_eq!(dollars_to_cents(f64::NEG_INFINITY), None);
        assert_eq!(dollars_to_cents(1e300), None);
    }

    #[test]
    fn test_parse_amount_accepts_common_forms() {
        assert_eq!(parse_amount("12.34").ok(), Some(1234));
        assert_eq!(parse_amount("$12").ok(), Some(1200));
        assert_eq!(parse_amount(" 0.5 ").ok(), Some(50));
        assert_eq!(parse_amount(".75").ok(), Some(75));
        assert_eq!(parse_amount("1,250.00").ok(), Some(125_000));
        assert_eq!(parse_amount("0").ok(), Some(0));
    }

    #[test]
    fn test_parse_amount_rejects_bad_input() {
        for bad in ["", "$", "abc", "1.234", "-5", "1.2.3", ".", "12a"] {
            assert!(
                matches!(parse_amount(bad), Err(Error::InvalidInput { .. })),
                "expected '{bad}' to be rejected"
            );
        }
        assert!(matches!(
            parse_amount("99999999"),
            Err(Error::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(1234), "$12.34");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(-5), "-$0.05");
        assert_eq!(format_cents(0), "$0.00");
    }
}
