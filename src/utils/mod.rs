//! Formatting and parsing helpers for Brazilian-locale amounts
//!
//! Amounts are shown as `R$ 1.234,56` (period for thousands, comma for
//! decimals) and accepted on the command line in either that form or plain
//! `1234.56`.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Currency symbol options for formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencySymbol {
    /// Include "R$ " prefix (Brazilian Real)
    BRL,
    /// Bare number
    None,
}

fn group_thousands(integer_part: &str) -> String {
    let digits: Vec<char> = integer_part.chars().collect();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(*c);
    }
    out
}

/// `part / base * 100`, or `None` when the base is zero or the result does not fit a `Decimal`
pub fn checked_percent(part: Decimal, base: Decimal) -> Option<Decimal> {
    part.checked_div(base)?.checked_mul(Decimal::ONE_HUNDRED)
}

/// Like [`checked_percent`], but 0 for a zero base and clamped to the
/// `Decimal` range on overflow.
///
/// # Examples
/// ```
/// use holdings::utils::percent_of;
/// use rust_decimal::Decimal;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(percent_of(dec!(20), dec!(1000)), dec!(2));
/// assert_eq!(percent_of(dec!(20), Decimal::ZERO), Decimal::ZERO);
/// assert_eq!(percent_of(Decimal::MAX, dec!(0.001)), Decimal::MAX);
/// ```
pub fn percent_of(part: Decimal, base: Decimal) -> Decimal {
    if base.is_zero() {
        return Decimal::ZERO;
    }
    checked_percent(part, base).unwrap_or(
        if part.is_sign_negative() == base.is_sign_negative() {
            Decimal::MAX
        } else {
            Decimal::MIN
        },
    )
}

/// Format a value with Brazilian separators, right-aligned to `width` (0 for none).
///
/// # Examples
/// ```
/// use holdings::utils::{format_currency_with_width, CurrencySymbol};
/// use rust_decimal_macros::dec;
///
/// assert_eq!(
///     format_currency_with_width(dec!(1234.56), 0, CurrencySymbol::BRL),
///     "R$ 1.234,56"
/// );
/// assert_eq!(
///     format_currency_with_width(dec!(1234), 12, CurrencySymbol::None),
///     "    1.234,00"
/// );
/// ```
pub fn format_currency_with_width(value: Decimal, width: usize, symbol: CurrencySymbol) -> String {
    let sign = if value.is_sign_negative() && !value.round_dp(2).is_zero() {
        "-"
    } else {
        ""
    };
    let formatted = format!("{:.2}", value.abs());
    let (integer_part, decimal_part) = formatted
        .split_once('.')
        .unwrap_or((formatted.as_str(), "00"));

    let prefix = match symbol {
        CurrencySymbol::BRL => "R$ ",
        CurrencySymbol::None => "",
    };
    let result = format!(
        "{}{}{},{}",
        prefix,
        sign,
        group_thousands(integer_part),
        decimal_part
    );

    if width > 0 && result.len() < width {
        format!("{:>width$}", result, width = width)
    } else {
        result
    }
}

/// Format as Brazilian Real with symbol: "R$ 1.234,56"
///
/// # Examples
/// ```
/// use holdings::utils::format_currency;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_currency(dec!(1234.56)), "R$ 1.234,56");
/// assert_eq!(format_currency(dec!(-500)), "R$ -500,00");
/// ```
pub fn format_currency(value: Decimal) -> String {
    format_currency_with_width(value, 0, CurrencySymbol::BRL)
}

/// Format a percentage with one decimal place and a comma: "12,3%"
///
/// # Examples
/// ```
/// use holdings::utils::format_percent;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_percent(dec!(2)), "2,0%");
/// assert_eq!(format_percent(dec!(-0.04)), "0,0%");
/// assert_eq!(format_percent(dec!(-12.345)), "-12,3%");
/// ```
pub fn format_percent(value: Decimal) -> String {
    let rounded = value.round_dp(1);
    let rounded = if rounded.is_zero() { Decimal::ZERO } else { rounded };
    format!("{:.1}%", rounded).replace('.', ",")
}

/// Parse an amount typed by a user, in Brazilian or plain notation
///
/// `1.234,56`, `1234,56`, `R$ 1.234,56` and `1234.56` all parse to the same
/// value. Without a comma, a period is the decimal separator.
///
/// # Examples
/// ```
/// use holdings::utils::parse_amount;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(parse_amount("R$ 1.234,56"), Some(dec!(1234.56)));
/// assert_eq!(parse_amount("1234.56"), Some(dec!(1234.56)));
/// assert_eq!(parse_amount("-"), None);
/// ```
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    Decimal::from_str(&normalized).ok()
}
