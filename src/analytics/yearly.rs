use super::round_pct;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{DeviationStats, MovingAveragePoint, YearlySummary, percent_change};
use rust_decimal::Decimal;

/// One summary per calendar year present in `points` (ordered by date).
pub fn summarize_years(points: &[MovingAveragePoint]) -> PipelineResult<Vec<YearlySummary>> {
    points
        .chunk_by(|a, b| a.year() == b.year())
        .map(summarize_year)
        .collect()
}

fn summarize_year(days: &[MovingAveragePoint]) -> PipelineResult<YearlySummary> {
    let first = &days[0];
    let last = &days[days.len() - 1];

    let low = days.iter().map(|p| p.price).min().unwrap_or(first.price);
    let high = days.iter().map(|p| p.price).max().unwrap_or(first.price);

    let change_pct = percent_change(first.price, last.price)
        .ok_or_else(|| PipelineError::overflow(last.date, "yearly change"))?;

    Ok(YearlySummary {
        year: first.year(),
        days: days.len(),
        open: first.price,
        low,
        high,
        close: last.price,
        change_pct: round_pct(change_pct),
        deviation: deviation_stats(days)?,
    })
}

fn deviation_stats(days: &[MovingAveragePoint]) -> PipelineResult<Option<DeviationStats>> {
    let mut count = 0usize;
    let mut sum = Decimal::ZERO;
    let mut min: Option<Decimal> = None;
    let mut max: Option<Decimal> = None;
    let mut days_below = 0usize;

    for point in days {
        let Some(dev) = point.deviation_pct()? else {
            continue;
        };
        count += 1;
        sum = sum
            .checked_add(dev)
            .ok_or_else(|| PipelineError::overflow(point.date, "yearly deviation sum"))?;
        min = Some(min.map_or(dev, |m| m.min(dev)));
        max = Some(max.map_or(dev, |m| m.max(dev)));
        if point.moving_average.is_some_and(|ma| point.price < ma) {
            days_below += 1;
        }
    }

    let (Some(min), Some(max)) = (min, max) else {
        return Ok(None);
    };
    Ok(Some(DeviationStats {
        computable_days: count,
        min_pct: round_pct(min),
        mean_pct: round_pct(sum / Decimal::from(count)),
        max_pct: round_pct(max),
        days_below,
    }))
}
