//! Output writer for `processed_data.csv`, `yearly_summary.csv`,
//! `histogram.csv` and the supplemental `price_analytics.csv`.
//!
//! All tables are rendered and validated in memory first. Files are only
//! touched once every row has passed its schema, and the final names appear
//! through renames after every temp file is complete.

pub mod schema;

use crate::analytics::Analytics;
use crate::analytics::histogram::TOTAL_LABEL;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{DailyChange, HistogramBucket, MovingAveragePoint, PriceChange, YearlySummary};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const PROCESSED_DATA_FILE: &str = "processed_data.csv";
pub const YEARLY_SUMMARY_FILE: &str = "yearly_summary.csv";
pub const HISTOGRAM_FILE: &str = "histogram.csv";
pub const PRICE_ANALYTICS_FILE: &str = "price_analytics.csv";

const PROCESSED_HEADER: [&str; 3] = ["date", "price", "moving_average"];
const YEARLY_HEADER: [&str; 12] = [
    "year",
    "days",
    "open",
    "low",
    "high",
    "close",
    "change_pct",
    "computable_days",
    "min_deviation_pct",
    "mean_deviation_pct",
    "max_deviation_pct",
    "days_below_moving_average",
];
const HISTOGRAM_HEADER: [&str; 2] = ["label", "days"];
const PRICE_ANALYTICS_HEADER: [&str; 14] = [
    "date",
    "open",
    "high",
    "low",
    "close",
    "moving_average",
    "ma_change",
    "ma_change_pct",
    "window_change",
    "window_change_pct",
    "swing",
    "swing_pct",
    "day_change",
    "day_change_pct",
];

/// Two-decimal text without separators; negative zero prints as `0.00`.
pub fn fmt_cents(value: Decimal) -> String {
    let mut v = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    v.rescale(2);
    if v.is_zero() {
        v.set_sign_positive(true);
    }
    v.to_string()
}

/// A validated table ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTable {
    pub file_name: &'static str,
    pub bytes: Vec<u8>,
    pub rows: usize,
}

fn render(file_name: &'static str, header: &[&str], rows: Vec<Vec<String>>) -> PipelineResult<RenderedTable> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))?;
    Ok(RenderedTable {
        file_name,
        bytes,
        rows: rows.len(),
    })
}

// ── processed_data.csv ────────────────────────────────────────────────────────

pub fn render_processed(points: &[MovingAveragePoint]) -> PipelineResult<RenderedTable> {
    let table = PROCESSED_DATA_FILE;
    let mut rows = Vec::with_capacity(points.len());
    let mut previous: Option<NaiveDate> = None;

    for (i, point) in points.iter().enumerate() {
        let row = i + 1;
        let date = point.date.format("%Y-%m-%d").to_string();
        let parsed = schema::check_date(&date).map_err(|e| PipelineError::schema(table, row, "date", e))?;
        if let Some(prev) = previous {
            if (parsed - prev).num_days() != 1 {
                return Err(PipelineError::schema(
                    table,
                    row,
                    "date",
                    format!("{parsed} does not follow {prev} by exactly one day"),
                ));
            }
        }
        previous = Some(parsed);

        let price = fmt_cents(point.price);
        schema::check_price(&price).map_err(|e| PipelineError::schema(table, row, "price", e))?;

        let moving_average = match point.moving_average {
            Some(ma) => {
                let text = fmt_cents(ma);
                schema::check_price(&text)
                    .map_err(|e| PipelineError::schema(table, row, "moving_average", e))?;
                text
            }
            None => String::new(),
        };

        rows.push(vec![date, price, moving_average]);
    }

    render(table, &PROCESSED_HEADER, rows)
}

// ── yearly_summary.csv ────────────────────────────────────────────────────────

pub fn render_yearly(years: &[YearlySummary]) -> PipelineResult<RenderedTable> {
    let table = YEARLY_SUMMARY_FILE;
    let mut rows = Vec::with_capacity(years.len());

    for (i, y) in years.iter().enumerate() {
        let row = i + 1;
        schema::check_year(y.year).map_err(|e| PipelineError::schema(table, row, "year", e))?;

        let prices = [("open", y.open), ("low", y.low), ("high", y.high), ("close", y.close)];
        let mut cells = vec![y.year.to_string(), y.days.to_string()];
        for (column, value) in prices {
            let text = fmt_cents(value);
            schema::check_price(&text).map_err(|e| PipelineError::schema(table, row, column, e))?;
            cells.push(text);
        }

        let pct = |column: &str, value: Option<Decimal>| -> PipelineResult<String> {
            let Some(value) = value else {
                return Ok(String::new());
            };
            let text = fmt_cents(value);
            schema::check_percentage(&text).map_err(|e| PipelineError::schema(table, row, column, e))?;
            Ok(text)
        };

        let dev = y.deviation.as_ref();
        cells.push(pct("change_pct", Some(y.change_pct))?);
        cells.push(dev.map(|d| d.computable_days).unwrap_or(0).to_string());
        cells.push(pct("min_deviation_pct", dev.map(|d| d.min_pct))?);
        cells.push(pct("mean_deviation_pct", dev.map(|d| d.mean_pct))?);
        cells.push(pct("max_deviation_pct", dev.map(|d| d.max_pct))?);
        cells.push(dev.map(|d| d.days_below.to_string()).unwrap_or_default());

        rows.push(cells);
    }

    render(table, &YEARLY_HEADER, rows)
}

// ── histogram.csv ─────────────────────────────────────────────────────────────

pub fn render_histogram(buckets: &[HistogramBucket]) -> PipelineResult<RenderedTable> {
    let table = HISTOGRAM_FILE;

    let Some((total, counted)) = buckets.split_last() else {
        return Err(PipelineError::schema(table, 0, "label", "histogram has no rows"));
    };
    if total.label != TOTAL_LABEL {
        return Err(PipelineError::schema(
            table,
            buckets.len(),
            "label",
            format!("last row must be {TOTAL_LABEL:?}"),
        ));
    }
    let sum: usize = counted.iter().map(|b| b.day_count).sum();
    if sum != total.day_count {
        return Err(PipelineError::schema(
            table,
            buckets.len(),
            "days",
            format!("total {} does not equal bucket sum {sum}", total.day_count),
        ));
    }

    let mut rows = Vec::with_capacity(buckets.len());
    for (i, bucket) in buckets.iter().enumerate() {
        let row = i + 1;
        schema::check_label(&bucket.label).map_err(|e| PipelineError::schema(table, row, "label", e))?;
        if i < counted.len() && bucket.label == TOTAL_LABEL {
            return Err(PipelineError::schema(table, row, "label", "total row must be last"));
        }
        rows.push(vec![bucket.label.clone(), bucket.day_count.to_string()]);
    }

    render(table, &HISTOGRAM_HEADER, rows)
}

// ── price_analytics.csv ───────────────────────────────────────────────────────

pub fn render_price_analytics(days: &[DailyChange]) -> PipelineResult<RenderedTable> {
    let table = PRICE_ANALYTICS_FILE;
    let mut rows = Vec::with_capacity(days.len());

    for (i, d) in days.iter().enumerate() {
        let row = i + 1;
        let date = d.date.format("%Y-%m-%d").to_string();
        schema::check_date(&date).map_err(|e| PipelineError::schema(table, row, "date", e))?;

        let price = |column: &str, value: Option<Decimal>| -> PipelineResult<String> {
            let Some(value) = value else {
                return Ok(String::new());
            };
            let text = fmt_cents(value);
            schema::check_price(&text).map_err(|e| PipelineError::schema(table, row, column, e))?;
            Ok(text)
        };
        let change = |column: &str, value: Option<PriceChange>| -> PipelineResult<[String; 2]> {
            let Some(value) = value else {
                return Ok([String::new(), String::new()]);
            };
            let amount = fmt_cents(value.amount);
            schema::check_amount(&amount).map_err(|e| PipelineError::schema(table, row, column, e))?;
            let pct = fmt_cents(value.pct);
            schema::check_percentage(&pct).map_err(|e| PipelineError::schema(table, row, column, e))?;
            Ok([amount, pct])
        };

        let mut cells = vec![
            date,
            price("open", d.open)?,
            price("high", d.high)?,
            price("low", d.low)?,
            price("close", Some(d.close))?,
            price("moving_average", d.moving_average)?,
        ];
        cells.extend(change("ma_change", d.moving_average_change)?);
        cells.extend(change("window_change", d.window_change)?);
        cells.extend(change("swing", d.swing)?);
        cells.extend(change("day_change", d.day_change)?);
        rows.push(cells);
    }

    render(table, &PRICE_ANALYTICS_HEADER, rows)
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Render every table; nothing is written if any row fails validation.
pub fn render_all(points: &[MovingAveragePoint], analytics: &Analytics) -> PipelineResult<Vec<RenderedTable>> {
    Ok(vec![
        render_processed(points)?,
        render_yearly(&analytics.yearly)?,
        render_histogram(&analytics.histogram)?,
        render_price_analytics(&analytics.daily)?,
    ])
}

pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stage every table next to its destination, then rename into place.
    pub fn write_all(&self, tables: &[RenderedTable]) -> PipelineResult<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)?;

        let mut staged = Vec::with_capacity(tables.len());
        for table in tables {
            let tmp = self.dir.join(format!(".{}.tmp", table.file_name));
            if let Err(e) = std::fs::write(&tmp, &table.bytes) {
                cleanup(&staged);
                let _ = std::fs::remove_file(&tmp);
                return Err(e.into());
            }
            debug!("Staged {} ({} rows)", tmp.display(), table.rows);
            staged.push((tmp, self.dir.join(table.file_name)));
        }

        // Each rename is atomic on its own, the set of renames is not. On a
        // failure the tables already swapped in are restored from backups.
        let mut swapped: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(staged.len());
        for (i, (tmp, dest)) in staged.iter().enumerate() {
            match swap_in(tmp, dest) {
                Ok(backup) => swapped.push((dest.clone(), backup)),
                Err(e) => {
                    restore(&swapped);
                    cleanup(&staged[i..]);
                    return Err(e.into());
                }
            }
        }

        let mut written = Vec::with_capacity(swapped.len());
        for (dest, backup) in swapped {
            if let Some(backup) = backup {
                let _ = std::fs::remove_file(backup);
            }
            info!("Wrote {}", dest.display());
            written.push(dest);
        }
        Ok(written)
    }
}

fn backup_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.bak"))
}

/// Move `dest` aside (if present) and rename `tmp` over it. Returns the
/// backup path to drop on success or restore on a later failure.
fn swap_in(tmp: &Path, dest: &Path) -> std::io::Result<Option<PathBuf>> {
    let backup = if dest.exists() {
        let backup = backup_path(dest);
        std::fs::rename(dest, &backup)?;
        Some(backup)
    } else {
        None
    };
    if let Err(e) = std::fs::rename(tmp, dest) {
        if let Some(backup) = &backup {
            let _ = std::fs::rename(backup, dest);
        }
        return Err(e);
    }
    Ok(backup)
}

fn restore(swapped: &[(PathBuf, Option<PathBuf>)]) {
    for (dest, backup) in swapped.iter().rev() {
        match backup {
            Some(backup) => {
                let _ = std::fs::rename(backup, dest);
            }
            None => {
                let _ = std::fs::remove_file(dest);
            }
        }
    }
}

fn cleanup(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = std::fs::remove_file(tmp);
    }
}
