use rust_decimal::Decimal;
use std::time::Instant;
use tracing::info;

/// Logs when a command starts and how long it took once dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.start.elapsed()
        );
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a count with thousands separators.
pub fn fmt_number(n: usize) -> String {
    group_thousands(&n.to_string())
}

/// Dollar amount for terminal display: `$67,123.45`. Not for CSV output.
pub fn fmt_usd(value: Decimal) -> String {
    let text = crate::output::fmt_cents(value.abs());
    let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if value.is_sign_negative() && !value.is_zero() { "-" } else { "" };
    format!("{sign}${}.{frac}", group_thousands(int))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fmt_number() {
        assert_eq!(fmt_number(1_234_567), "1,234,567");
        assert_eq!(fmt_number(0), "0");
        assert_eq!(fmt_number(999), "999");
        assert_eq!(fmt_number(1000), "1,000");
    }

    #[test]
    fn test_fmt_usd() {
        assert_eq!(fmt_usd(dec!(67123.456)), "$67,123.46");
        assert_eq!(fmt_usd(dec!(12)), "$12.00");
        assert_eq!(fmt_usd(dec!(-1500.5)), "-$1,500.50");
    }
}
