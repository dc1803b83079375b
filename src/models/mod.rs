use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

// ── Price record ──────────────────────────────────────────────────────────────

/// One canonical trading day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    /// Close.
    pub price: Decimal,
    pub adjusted_close: Option<Decimal>,
    pub volume: u64,
    /// Synthesized by the carry-forward gap policy.
    pub filled: bool,
}

impl PriceRecord {
    pub fn new(date: NaiveDate, price: Decimal) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            price,
            adjusted_close: None,
            volume: 0,
            filled: false,
        }
    }
}

// ── Series ────────────────────────────────────────────────────────────────────

/// Records ordered strictly by date, one per day at most.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Series {
    records: Vec<PriceRecord>,
}

impl Series {
    /// Sort `records` by date and reject duplicates.
    pub fn new(mut records: Vec<PriceRecord>) -> PipelineResult<Self> {
        records.sort_by_key(|r| r.date);
        if let Some(pair) = records.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(PipelineError::DuplicateDate {
                source_name: "series".to_string(),
                date: pair[0].date,
                first_row: 0,
                second_row: 0,
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PriceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }
}

// ── Raw source rows ───────────────────────────────────────────────────────────

/// Layout of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Month | Day | Year | Open | High | Low | Close | AdjClose | Volume, comma-grouped numbers.
    Historical,
    /// Date (YYYY-MM-DD) | Open | High | Low | Close | AdjClose | Volume, plain numbers.
    Daily,
}

impl SourceKind {
    pub fn default_delimiter(self) -> u8 {
        match self {
            SourceKind::Historical => b'\t',
            SourceKind::Daily => b',',
        }
    }
}

/// Historical TSV row: date split over three columns.
#[derive(Debug, Clone, Default)]
pub struct RawHistoricalRow {
    pub month: Option<String>,
    pub day: Option<String>,
    pub year: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub price: Option<String>,
    pub adj_close: Option<String>,
    pub volume: Option<String>,
}

/// Daily CSV row written by the `update` command.
#[derive(Debug, Clone, Default)]
pub struct RawDailyRow {
    pub date: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub price: Option<String>,
    pub adj_close: Option<String>,
    pub volume: Option<String>,
}

/// One raw row tagged with the layout it came from.
#[derive(Debug, Clone)]
pub enum SourceRecord {
    Historical(RawHistoricalRow),
    Daily(RawDailyRow),
}

// ── Derived outputs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovingAveragePoint {
    pub date: NaiveDate,
    pub price: Decimal,
    /// `None` until the window is full.
    pub moving_average: Option<Decimal>,
}

impl MovingAveragePoint {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Percentage distance of price above (positive) or below the average;
    /// `Ok(None)` while the window is not full.
    pub fn deviation_pct(&self) -> PipelineResult<Option<Decimal>> {
        let Some(ma) = self.moving_average.filter(|ma| !ma.is_zero()) else {
            return Ok(None);
        };
        percent_change(ma, self.price)
            .map(Some)
            .ok_or_else(|| PipelineError::overflow(self.date, "deviation from moving average"))
    }
}

/// `(to - from) / from * 100`, or `None` on overflow or a zero base.
pub fn percent_change(from: Decimal, to: Decimal) -> Option<Decimal> {
    to.checked_sub(from)?
        .checked_div(from)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviationStats {
    pub computable_days: usize,
    pub min_pct: Decimal,
    pub mean_pct: Decimal,
    pub max_pct: Decimal,
    pub days_below: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearlySummary {
    pub year: i32,
    pub days: usize,
    pub open: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub close: Decimal,
    pub change_pct: Decimal,
    /// Absent when no day of the year has a moving average.
    pub deviation: Option<DeviationStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramBucket {
    pub label: String,
    pub day_count: usize,
}

/// Dollar and percentage difference between two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceChange {
    pub amount: Decimal,
    pub pct: Decimal,
}

/// One row of the per-day price analytics table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyChange {
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Decimal,
    pub moving_average: Option<Decimal>,
    /// Moving average against the previous day's.
    pub moving_average_change: Option<PriceChange>,
    /// Close against the close one full window earlier.
    pub window_change: Option<PriceChange>,
    /// High against low of the same day.
    pub swing: Option<PriceChange>,
    /// Close against the previous day's close.
    pub day_change: Option<PriceChange>,
}
