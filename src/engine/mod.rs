//! Moving-average engine.
//!
//! Trailing simple moving average over a fixed window of contiguous days
//! (1,400 days = 200 weeks by default). The running sum is exact decimal;
//! the only rounding happens when the sum is divided by the window length.

use crate::error::{PipelineError, PipelineResult};
use crate::models::{MovingAveragePoint, Series};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

pub const DEFAULT_WINDOW_DAYS: usize = 1400;

/// Mean of `sum` over `count` values, rounded half-to-even to cents.
pub fn mean_to_cents(sum: Decimal, count: usize) -> Decimal {
    let mut mean = (sum / Decimal::from(count))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    mean.rescale(2);
    mean
}

#[derive(Debug, Clone, Copy)]
pub struct MovingAverageEngine {
    window: usize,
}

impl MovingAverageEngine {
    pub fn new(window: usize) -> PipelineResult<Self> {
        if window == 0 {
            return Err(PipelineError::InvalidSettings(
                "moving-average window must be at least 1 day".to_string(),
            ));
        }
        Ok(Self { window })
    }

    /// One point per record; `moving_average` is set once the window is full.
    /// A break in the daily timeline restarts the window.
    pub fn compute(&self, series: &Series) -> PipelineResult<MovingAverages> {
        let records = series.records();
        let mut points = Vec::with_capacity(records.len());
        let mut history = Vec::with_capacity(records.len());

        let mut sum = Decimal::ZERO;
        let mut run_start = 0usize;

        for (i, rec) in records.iter().enumerate() {
            if i > 0 && (rec.date - records[i - 1].date).num_days() != 1 {
                debug!("Timeline break before {}, restarting window", rec.date);
                sum = Decimal::ZERO;
                run_start = i;
            }

            sum = sum
                .checked_add(rec.price)
                .ok_or_else(|| PipelineError::overflow(rec.date, "moving-average window sum"))?;
            let run_len = i - run_start + 1;
            if run_len > self.window {
                sum = sum
                    .checked_sub(records[i - self.window].price)
                    .ok_or_else(|| PipelineError::overflow(rec.date, "moving-average window sum"))?;
            }

            points.push(MovingAveragePoint {
                date: rec.date,
                price: rec.price,
                moving_average: (run_len >= self.window).then(|| mean_to_cents(sum, self.window)),
            });
            history.push(run_len);
        }

        Ok(MovingAverages {
            window: self.window,
            points,
            history,
        })
    }
}

impl Default for MovingAverageEngine {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW_DAYS,
        }
    }
}

/// Engine output, ordered by date.
#[derive(Debug, Clone)]
pub struct MovingAverages {
    window: usize,
    points: Vec<MovingAveragePoint>,
    /// Contiguous days ending at each point, inclusive.
    history: Vec<usize>,
}

impl MovingAverages {
    pub fn points(&self) -> &[MovingAveragePoint] {
        &self.points
    }

    pub fn computable(&self) -> impl Iterator<Item = &MovingAveragePoint> {
        self.points.iter().filter(|p| p.moving_average.is_some())
    }

    pub fn computable_count(&self) -> usize {
        self.computable().count()
    }

    /// Moving average for `date`, or `InsufficientHistory` when the window
    /// is not full there.
    pub fn require(&self, date: NaiveDate) -> PipelineResult<Decimal> {
        let idx = self.points.binary_search_by_key(&date, |p| p.date);
        let available = idx.map(|i| self.history[i]).unwrap_or(0);
        idx.ok()
            .and_then(|i| self.points[i].moving_average)
            .ok_or(PipelineError::InsufficientHistory {
                date,
                available,
                required: self.window,
            })
    }

    pub fn latest(&self) -> Option<&MovingAveragePoint> {
        self.points.last()
    }
}
