use crate::error::{PipelineError, PipelineResult};
use crate::models::{PriceRecord, RawDailyRow, RawHistoricalRow, SourceRecord};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub const MIN_YEAR: i32 = 2009;
pub const MAX_YEAR: i32 = 2100;

/// Largest accepted price, $999,999,999,999.99. Keeps every window sum and
/// percentage well inside `Decimal` range.
pub const MAX_PRICE: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

// ── Field parsers ─────────────────────────────────────────────────────────────

/// "Jan" → 1 … "Dec" → 12
pub fn parse_month(s: &str) -> Option<u32> {
    let s = s.trim();
    MONTHS.iter().position(|m| *m == s).map(|i| i as u32 + 1)
}

pub fn parse_day(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().filter(|d| (1..=31).contains(d))
}

pub fn parse_year(s: &str) -> Option<i32> {
    let s = s.trim();
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
}

pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Integer part of `^\d{1,3}(,?\d{3})*`: leading digits, then groups whose
/// digit count is a multiple of three, each introduced by a comma.
fn is_grouped_digits(s: &str) -> bool {
    let mut segments = s.split(',');
    let Some(first) = segments.next() else {
        return false;
    };
    if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    segments.all(|seg| {
        !seg.is_empty() && seg.len() % 3 == 0 && seg.bytes().all(|b| b.is_ascii_digit())
    })
}

/// Parse a comma-grouped price into an exact 2-decimal value.
/// "1,234.5" → 1234.50 | "610" → 610.00 | "1.234" → None
pub fn parse_grouped_price(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };

    if !is_grouped_digits(int_part) {
        return None;
    }
    if let Some(f) = frac_part {
        if f.is_empty() || f.len() > 2 || !f.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }

    let cleaned = s.replace(',', "");
    let mut value = Decimal::from_str(&cleaned).ok()?;
    value.rescale(2);
    Some(value)
}

/// Parse a comma-grouped integer. "1,234,567" → 1234567
pub fn parse_grouped_integer(s: &str) -> Option<u64> {
    let s = s.trim();
    if !is_grouped_digits(s) {
        return None;
    }
    s.replace(',', "").parse().ok()
}

// ── Row conversion ────────────────────────────────────────────────────────────

struct RowContext<'a> {
    source_name: &'a str,
    row: usize,
}

impl RowContext<'_> {
    fn required<'v>(&self, column: &str, value: &'v Option<String>) -> PipelineResult<&'v str> {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(self.malformed(column, "", "missing value")),
        }
    }

    fn malformed(&self, column: &str, value: &str, reason: &str) -> PipelineError {
        PipelineError::malformed(self.source_name, self.row, column, value, reason)
    }

    fn price(&self, column: &str, raw: &str) -> PipelineResult<Decimal> {
        let price = parse_grouped_price(raw)
            .ok_or_else(|| self.malformed(column, raw, "not a comma-grouped decimal"))?;
        if price <= Decimal::ZERO {
            return Err(self.malformed(column, raw, "price must be greater than 0.00"));
        }
        if price > MAX_PRICE {
            return Err(self.malformed(column, raw, "price exceeds 999,999,999,999.99"));
        }
        Ok(price)
    }

    /// Open, high and low are optional; when both are given, high ≥ low.
    fn day_range(
        &self,
        open: &Option<String>,
        high: &Option<String>,
        low: &Option<String>,
    ) -> PipelineResult<(Option<Decimal>, Option<Decimal>, Option<Decimal>)> {
        let open = self.optional_price("open", open)?;
        let high_value = self.optional_price("high", high)?;
        let low_value = self.optional_price("low", low)?;
        if let (Some(h), Some(l)) = (high_value, low_value) {
            if h < l {
                let raw = high.as_deref().unwrap_or_default();
                return Err(self.malformed("high", raw, "high is below low"));
            }
        }
        Ok((open, high_value, low_value))
    }

    fn optional_price(&self, column: &str, value: &Option<String>) -> PipelineResult<Option<Decimal>> {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => self.price(column, v).map(Some),
            _ => Ok(None),
        }
    }

    fn volume(&self, value: &Option<String>) -> PipelineResult<u64> {
        let raw = self.required("volume", value)?;
        parse_grouped_integer(raw)
            .ok_or_else(|| self.malformed("volume", raw, "not a comma-grouped integer"))
    }
}

pub fn historical_row_to_record(
    source_name: &str,
    row: usize,
    raw: &RawHistoricalRow,
) -> PipelineResult<PriceRecord> {
    let ctx = RowContext { source_name, row };

    let month_str = ctx.required("month", &raw.month)?;
    let month = parse_month(month_str)
        .ok_or_else(|| ctx.malformed("month", month_str, "expected Jan..Dec"))?;

    let day_str = ctx.required("day", &raw.day)?;
    let day = parse_day(day_str).ok_or_else(|| ctx.malformed("day", day_str, "expected 1-31"))?;

    let year_str = ctx.required("year", &raw.year)?;
    let year = parse_year(year_str)
        .ok_or_else(|| ctx.malformed("year", year_str, "expected 2009-2100"))?;

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        ctx.malformed(
            "day",
            &format!("{year_str}-{month_str}-{day_str}"),
            "not a calendar date",
        )
    })?;

    let price = ctx.price("price", ctx.required("price", &raw.price)?)?;

    let (open, high, low) = ctx.day_range(&raw.open, &raw.high, &raw.low)?;

    Ok(PriceRecord {
        open,
        high,
        low,
        adjusted_close: ctx.optional_price("adj_close", &raw.adj_close)?,
        volume: ctx.volume(&raw.volume)?,
        ..PriceRecord::new(date, price)
    })
}

pub fn daily_row_to_record(
    source_name: &str,
    row: usize,
    raw: &RawDailyRow,
) -> PipelineResult<PriceRecord> {
    let ctx = RowContext { source_name, row };

    let date_str = ctx.required("date", &raw.date)?;
    let date = parse_iso_date(date_str)
        .ok_or_else(|| ctx.malformed("date", date_str, "expected YYYY-MM-DD"))?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&chrono::Datelike::year(&date)) {
        return Err(ctx.malformed("date", date_str, "year outside 2009-2100"));
    }

    let price = ctx.price("price", ctx.required("price", &raw.price)?)?;

    let (open, high, low) = ctx.day_range(&raw.open, &raw.high, &raw.low)?;

    Ok(PriceRecord {
        open,
        high,
        low,
        adjusted_close: ctx.optional_price("adj_close", &raw.adj_close)?,
        volume: ctx.volume(&raw.volume)?,
        ..PriceRecord::new(date, price)
    })
}

impl SourceRecord {
    pub fn into_price_record(self, source_name: &str, row: usize) -> PipelineResult<PriceRecord> {
        match self {
            SourceRecord::Historical(raw) => historical_row_to_record(source_name, row, &raw),
            SourceRecord::Daily(raw) => daily_row_to_record(source_name, row, &raw),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn hist(month: &str, day: &str, year: &str, price: &str) -> RawHistoricalRow {
        RawHistoricalRow {
            month: Some(month.into()),
            day: Some(day.into()),
            year: Some(year.into()),
            price: Some(price.into()),
            volume: Some("1,000".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_grouped_price() {
        assert_eq!(parse_grouped_price("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_grouped_price("67,123.4"), Some(dec!(67123.40)));
        assert_eq!(parse_grouped_price("610"), Some(dec!(610.00)));
        assert_eq!(parse_grouped_price("1234567.89"), Some(dec!(1234567.89)));
        assert_eq!(parse_grouped_price("0.05"), Some(dec!(0.05)));
        assert_eq!(parse_grouped_price("1,234.567"), None);
        assert_eq!(parse_grouped_price("1,23.00"), None);
        assert_eq!(parse_grouped_price(",123"), None);
        assert_eq!(parse_grouped_price("12."), None);
        assert_eq!(parse_grouped_price("-5.00"), None);
        assert_eq!(parse_grouped_price("$5.00"), None);
        assert_eq!(parse_grouped_price(""), None);
    }

    #[test]
    fn parsed_prices_always_carry_two_decimals() {
        assert_eq!(parse_grouped_price("7").unwrap().to_string(), "7.00");
        assert_eq!(parse_grouped_price("7.5").unwrap().to_string(), "7.50");
    }

    #[test]
    fn test_parse_grouped_integer() {
        assert_eq!(parse_grouped_integer("12,345,678"), Some(12_345_678));
        assert_eq!(parse_grouped_integer("0"), Some(0));
        assert_eq!(parse_grouped_integer("12,34"), None);
        assert_eq!(parse_grouped_integer("1.5"), None);
    }

    #[test]
    fn test_date_fields() {
        assert_eq!(parse_month("Jan"), Some(1));
        assert_eq!(parse_month("Dec"), Some(12));
        assert_eq!(parse_month("January"), None);
        assert_eq!(parse_month("jan"), None);
        assert_eq!(parse_day("31"), Some(31));
        assert_eq!(parse_day("0"), None);
        assert_eq!(parse_day("32"), None);
        assert_eq!(parse_year("2009"), Some(2009));
        assert_eq!(parse_year("2008"), None);
        assert_eq!(parse_year("2101"), None);
    }

    #[test]
    fn historical_row_converts() {
        let rec = historical_row_to_record("h.tsv", 1, &hist("Sep", "17", "2014", "457.33")).unwrap();
        assert_eq!(rec.date, NaiveDate::from_ymd_opt(2014, 9, 17).unwrap());
        assert_eq!(rec.price, dec!(457.33));
        assert_eq!(rec.volume, 1000);
        assert_eq!(rec.adjusted_close, None);
    }

    #[test]
    fn impossible_calendar_date_is_malformed() {
        let err = historical_row_to_record("h.tsv", 4, &hist("Feb", "30", "2015", "1.00")).unwrap_err();
        match err {
            PipelineError::MalformedRecord { row, column, .. } => {
                assert_eq!(row, 4);
                assert_eq!(column, "day");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn zero_price_is_malformed() {
        let err = historical_row_to_record("h.tsv", 2, &hist("Jan", "20", "2015", "0.00")).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { .. }));
    }

    #[test]
    fn daily_row_rejects_grouped_date_format() {
        let raw = RawDailyRow {
            date: Some("09/17/2014".into()),
            price: Some("457.33".into()),
            adj_close: Some("457.33".into()),
            volume: Some("21056800".into()),
            ..Default::default()
        };
        assert!(daily_row_to_record("d.csv", 1, &raw).is_err());

        let ok = RawDailyRow { date: Some("2014-09-17".into()), ..raw };
        let rec = SourceRecord::Daily(ok).into_price_record("d.csv", 1).unwrap();
        assert_eq!(rec.adjusted_close, Some(dec!(457.33)));
        assert_eq!(rec.volume, 21_056_800);
    }

    #[test]
    fn historical_row_keeps_day_range() {
        let raw = RawHistoricalRow {
            open: Some("465.86".into()),
            high: Some("468.17".into()),
            low: Some("452.42".into()),
            ..hist("Sep", "17", "2014", "457.33")
        };
        let rec = historical_row_to_record("h.tsv", 1, &raw).unwrap();
        assert_eq!(rec.open, Some(dec!(465.86)));
        assert_eq!(rec.high, Some(dec!(468.17)));
        assert_eq!(rec.low, Some(dec!(452.42)));
    }

    #[test]
    fn high_below_low_is_malformed() {
        let raw = RawHistoricalRow {
            high: Some("400.00".into()),
            low: Some("452.42".into()),
            ..hist("Sep", "17", "2014", "457.33")
        };
        let err = historical_row_to_record("h.tsv", 3, &raw).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { row: 3, ref column, .. } if column == "high"));
    }

    #[test]
    fn price_above_ceiling_is_malformed() {
        assert_eq!(MAX_PRICE, dec!(999999999999.99));
        let ok = historical_row_to_record("h.tsv", 1, &hist("Jan", "20", "2015", "999,999,999,999.99"));
        assert_eq!(ok.unwrap().price, MAX_PRICE);

        let raw = RawDailyRow {
            date: Some("2015-01-20".into()),
            price: Some("100000000000000000000000000.00".into()),
            volume: Some("1".into()),
            ..Default::default()
        };
        let err = daily_row_to_record("d.csv", 7, &raw).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { row: 7, ref column, .. } if column == "price"));
    }
}
