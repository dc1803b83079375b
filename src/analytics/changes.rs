//! Per-day price analytics: moving-average drift, change over one full
//! window, intraday swing and day-over-day change.

use super::round_pct;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{DailyChange, MovingAveragePoint, PriceChange, PriceRecord, percent_change};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;

fn change(date: NaiveDate, from: Decimal, to: Decimal, operation: &'static str) -> PipelineResult<PriceChange> {
    let overflow = || PipelineError::overflow(date, operation);
    let amount = to.checked_sub(from).ok_or_else(overflow)?;
    let pct = percent_change(from, to).ok_or_else(overflow)?;
    Ok(PriceChange {
        amount,
        pct: round_pct(pct),
    })
}

/// One row per day. `records` and `points` describe the same days in the
/// same order, as produced by the engine from a normalized series.
pub fn daily_changes(
    records: &[PriceRecord],
    points: &[MovingAveragePoint],
    window: usize,
) -> PipelineResult<Vec<DailyChange>> {
    debug_assert_eq!(records.len(), points.len());
    let window_days = Days::new(window as u64);

    let mut rows = Vec::with_capacity(points.len());
    for (i, (record, point)) in records.iter().zip(points).enumerate() {
        let date = point.date;
        let previous = i
            .checked_sub(1)
            .map(|j| &points[j])
            .filter(|p| p.date.succ_opt() == Some(date));
        let earlier = i
            .checked_sub(window)
            .map(|j| &points[j])
            .filter(|p| p.date.checked_add_days(window_days) == Some(date));

        let moving_average_change = match (previous.and_then(|p| p.moving_average), point.moving_average) {
            (Some(from), Some(to)) => Some(change(date, from, to, "moving-average change")?),
            _ => None,
        };
        let window_change = earlier
            .map(|p| change(date, p.price, point.price, "window change"))
            .transpose()?;
        let swing = match (record.low, record.high) {
            (Some(low), Some(high)) => Some(change(date, low, high, "intraday swing")?),
            _ => None,
        };
        let day_change = previous
            .map(|p| change(date, p.price, point.price, "day change"))
            .transpose()?;

        rows.push(DailyChange {
            date,
            open: record.open,
            high: record.high,
            low: record.low,
            close: point.price,
            moving_average: point.moving_average,
            moving_average_change,
            window_change,
            swing,
            day_change,
        });
    }
    Ok(rows)
}
