use std::str::FromStr;

use rust_decimal::Decimal;

/// Decimal places kept for the BHD item rate.
pub const RATE_DP: u32 = 3;
/// Decimal places kept for quantities.
pub const QUANTITY_DP: u32 = 2;
/// Decimal places kept for the INR value.
pub const LOCAL_DP: u32 = 2;
/// Decimal places kept for the BHD value (BHD has 1000 fils).
pub const FOREIGN_DP: u32 = 3;

/// Fixed INR amount booked per unit of quantity.
pub const MULTIPLIER: Decimal = Decimal::ONE_THOUSAND;

/// Parse a loosely formatted numeric value, falling back to zero.
///
/// Accepts surrounding whitespace and thousands separators ("1,250.5").
/// Anything else that does not parse (empty strings, "n/a", "abc") becomes `0`.
pub fn coerce_numeric(input: &str) -> Decimal {
    let cleaned: String = input.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .unwrap_or(Decimal::ZERO)
}

/// Convert a spreadsheet float into a decimal at the given precision.
/// Non-finite values coerce to zero.
pub fn decimal_from_f64(value: f64, dp: u32) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp(dp))
        .unwrap_or(Decimal::ZERO)
}

/// Format a decimal with thousands separators and a fixed number of decimals.
/// Example: (1234567.5, 2) -> "1,234,567.50", (-0.125, 3) -> "-0.125"
pub fn format_amount(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp(dp);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let plain = format!("{:.*}", dp as usize, rounded.abs());
    let (units, fraction) = match plain.split_once('.') {
        Some((u, f)) => (u, Some(f)),
        None => (plain.as_str(), None),
    };

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, ch) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match fraction {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}
