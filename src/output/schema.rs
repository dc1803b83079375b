//! Column rules for the output tables.

use crate::analytics::histogram::is_valid_label;
use crate::normalizer::min_output_date;
use chrono::NaiveDate;

pub const MIN_OUTPUT_YEAR: i32 = 2009;

/// `YYYY-MM-DD`, on or after the schema minimum.
pub fn check_date(value: &str) -> Result<NaiveDate, String> {
    let date = (value.len() == 10)
        .then(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
        .flatten()
        .ok_or_else(|| format!("{value:?} is not YYYY-MM-DD"))?;
    if date < min_output_date() {
        return Err(format!("{date} is before {}", min_output_date()));
    }
    Ok(date)
}

/// Plain decimal, exactly two fractional digits, optional leading minus.
fn is_two_dp(value: &str) -> bool {
    let unsigned = value.strip_prefix('-').unwrap_or(value);
    match unsigned.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.len() == 2
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Price: two decimals, no separators, greater than 0.00.
pub fn check_price(value: &str) -> Result<(), String> {
    if !is_two_dp(value) || value.starts_with('-') {
        return Err(format!("{value:?} is not a plain 2-decimal price"));
    }
    if value.bytes().all(|b| b == b'0' || b == b'.') {
        return Err(format!("{value:?} must be greater than 0.00"));
    }
    Ok(())
}

/// Percentage: signed two-decimal number.
pub fn check_percentage(value: &str) -> Result<(), String> {
    if is_two_dp(value) {
        Ok(())
    } else {
        Err(format!("{value:?} is not a 2-decimal percentage"))
    }
}

/// Dollar change: signed two-decimal number, no separators.
pub fn check_amount(value: &str) -> Result<(), String> {
    if is_two_dp(value) {
        Ok(())
    } else {
        Err(format!("{value:?} is not a 2-decimal amount"))
    }
}

pub fn check_year(value: i32) -> Result<(), String> {
    if value >= MIN_OUTPUT_YEAR {
        Ok(())
    } else {
        Err(format!("{value} is before {MIN_OUTPUT_YEAR}"))
    }
}

pub fn check_label(value: &str) -> Result<(), String> {
    if is_valid_label(value) {
        Ok(())
    } else {
        Err(format!("{value:?} does not match the histogram label grammar"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates() {
        assert!(check_date("2009-01-13").is_ok());
        assert!(check_date("2009-01-12").is_err());
        assert!(check_date("2014-9-17").is_err());
        assert!(check_date("09/17/2014").is_err());
    }

    #[test]
    fn prices() {
        assert!(check_price("457.33").is_ok());
        assert!(check_price("0.01").is_ok());
        assert!(check_price("0.00").is_err());
        assert!(check_price("1,234.00").is_err());
        assert!(check_price("12.3").is_err());
        assert!(check_price("-1.00").is_err());
        assert!(check_price("").is_err());
    }

    #[test]
    fn percentages() {
        assert!(check_percentage("-12.50").is_ok());
        assert!(check_percentage("0.00").is_ok());
        assert!(check_percentage("12.5").is_err());
        assert!(check_percentage("-").is_err());
    }

    #[test]
    fn amounts() {
        assert!(check_amount("-1500.50").is_ok());
        assert!(check_amount("0.00").is_ok());
        assert!(check_amount("-1,500.50").is_err());
    }
}
