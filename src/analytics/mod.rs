//! Analytics aggregator: yearly summaries, the deviation histogram and the
//! per-day price analytics.

pub mod changes;
pub mod histogram;
pub mod yearly;

use crate::config::AnalyticsConfig;
use crate::error::PipelineResult;
use crate::models::{DailyChange, HistogramBucket, MovingAveragePoint, PriceRecord, YearlySummary};
use rust_decimal::{Decimal, RoundingStrategy};
use std::thread::ScopedJoinHandle;
use tracing::debug;

pub use self::changes::daily_changes;
pub use self::histogram::HistogramSpec;
pub use self::yearly::summarize_years;

/// Round a percentage half-to-even to two decimals.
pub fn round_pct(value: Decimal) -> Decimal {
    let mut v = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    v.rescale(2);
    v
}

/// Re-raise a worker panic on the calling thread.
fn join<T>(handle: ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

#[derive(Debug, Clone)]
pub struct Analytics {
    pub yearly: Vec<YearlySummary>,
    pub histogram: Vec<HistogramBucket>,
    pub daily: Vec<DailyChange>,
}

pub struct Aggregator {
    histogram: HistogramSpec,
    window: usize,
}

impl Aggregator {
    pub fn new(config: &AnalyticsConfig) -> PipelineResult<Self> {
        Ok(Self {
            histogram: HistogramSpec::new(config.histogram_width, config.histogram_bound)?,
            window: config.window_days,
        })
    }

    /// Every aggregation reads the same immutable slices; the histogram and
    /// the daily table run on scoped threads joined before anything returns.
    /// `records` is the series the `points` were computed from.
    pub fn aggregate(&self, records: &[PriceRecord], points: &[MovingAveragePoint]) -> PipelineResult<Analytics> {
        let (yearly, histogram, daily) = std::thread::scope(|s| {
            let histogram = s.spawn(|| self.histogram.build(points));
            let daily = s.spawn(|| daily_changes(records, points, self.window));
            let yearly = summarize_years(points);
            (yearly, join(histogram), join(daily))
        });
        let (yearly, histogram, daily) = (yearly?, histogram?, daily?);

        debug!(
            "Aggregated {} years, {} histogram rows, {} daily rows",
            yearly.len(),
            histogram.len(),
            daily.len()
        );
        Ok(Analytics {
            yearly,
            histogram,
            daily,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn round_pct_is_bankers_rounding() {
        assert_eq!(round_pct(dec!(1.005)), dec!(1.00));
        assert_eq!(round_pct(dec!(1.015)), dec!(1.02));
        assert_eq!(round_pct(dec!(-2.3456)), dec!(-2.35));
        assert_eq!(round_pct(dec!(5)).to_string(), "5.00");
    }

    #[test]
    fn aggregate_matches_sequential_computation() {
        let start = NaiveDate::from_ymd_opt(2020, 12, 25).unwrap();
        let points: Vec<_> = start
            .iter_days()
            .take(20)
            .enumerate()
            .map(|(i, date)| MovingAveragePoint {
                date,
                price: Decimal::new(10_000 + i as i64 * 150, 2),
                moving_average: (i >= 4).then(|| dec!(100.00)),
            })
            .collect();

        let records: Vec<_> = points
            .iter()
            .map(|p| PriceRecord::new(p.date, p.price))
            .collect();

        let agg = Aggregator::new(&AnalyticsConfig::default()).unwrap();
        let out = agg.aggregate(&records, &points).unwrap();

        assert_eq!(out.yearly, summarize_years(&points).unwrap());
        assert_eq!(out.histogram, agg.histogram.build(&points).unwrap());
        assert_eq!(out.daily, daily_changes(&records, &points, agg.window).unwrap());
        assert_eq!(out.histogram.last().unwrap().day_count, 16);
        assert_eq!(out.daily.len(), 20);
    }

    #[test]
    fn worker_errors_surface_from_aggregate() {
        let date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let points = vec![MovingAveragePoint {
            date,
            price: Decimal::MAX,
            moving_average: Some(dec!(0.01)),
        }];
        let records = vec![PriceRecord::new(date, Decimal::MAX)];

        let agg = Aggregator::new(&AnalyticsConfig::default()).unwrap();
        let err = agg.aggregate(&records, &points).unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::ArithmeticOverflow { .. }));
    }
}
