//! Pipeline orchestrator: loader → normalizer → engine → aggregator → writer.
//!
//! ## Run modes
//!
//! `compute()`: everything up to and including aggregation, in memory only.
//!   Used by `btracker stats`.
//!
//! `run()`: `compute()` followed by rendering and writing the CSV
//!   tables. Deterministic: the same input always produces the same bytes, and
//!   any failure leaves the previous output untouched.

use crate::analytics::{Aggregator, Analytics};
use crate::config::AppConfig;
use crate::engine::{MovingAverageEngine, MovingAverages};
use crate::loader::load_all;
use crate::models::PriceChange;
use crate::normalizer::normalize;
use crate::output::{render_all, OutputWriter};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::info;

pub struct Pipeline {
    config: AppConfig,
}

/// In-memory result of one run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub moving_averages: MovingAverages,
    pub analytics: Analytics,
    pub filled_days: usize,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn compute(&self) -> Result<PipelineOutput> {
        let analytics_cfg = &self.config.analytics;

        // ── 1. Load and merge sources ─────────────────────────────────────────
        info!("=== Step 1: Loading {} source(s) ===", self.config.sources.len());
        let merged = load_all(&self.config.sources, analytics_cfg.overlap_tolerance)
            .context("Failed to load price sources")?;

        // ── 2. Enforce a contiguous timeline ──────────────────────────────────
        info!("=== Step 2: Normalizing ({:?} policy) ===", analytics_cfg.gap_policy);
        let series = normalize(merged, analytics_cfg.gap_policy)
            .context("Price history is not contiguous")?;
        let filled_days = series.records().iter().filter(|r| r.filled).count();

        // ── 3. Moving average ─────────────────────────────────────────────────
        info!("=== Step 3: {}-day moving average ===", analytics_cfg.window_days);
        let engine = MovingAverageEngine::new(analytics_cfg.window_days)?;
        let moving_averages = engine.compute(&series)?;
        info!(
            "{} of {} days have a moving average",
            moving_averages.computable_count(),
            series.len()
        );

        // ── 4. Yearly summary + histogram + daily price analytics ─────────────
        info!("=== Step 4: Aggregating ===");
        let analytics =
            Aggregator::new(analytics_cfg)?.aggregate(series.records(), moving_averages.points())?;

        Ok(PipelineOutput {
            moving_averages,
            analytics,
            filled_days,
        })
    }

    pub fn run(&self) -> Result<PipelineStats> {
        let output = self.compute()?;

        // ── 5. Render, validate, write ────────────────────────────────────────
        info!("=== Step 5: Writing output ===");
        let tables = render_all(output.moving_averages.points(), &output.analytics)
            .context("Computed data violates the output schema")?;
        let writer = OutputWriter::new(&self.config.output.dir);
        let files = writer
            .write_all(&tables)
            .with_context(|| format!("Failed to write output to {:?}", writer.dir()))?;

        let stats = PipelineStats::from_output(&output, files);
        info!(
            "=== Done: {} days | {} with moving average | {} years | {} filled ===",
            stats.days, stats.computable_days, stats.years, stats.filled_days
        );
        Ok(stats)
    }
}

#[derive(Debug)]
pub struct PipelineStats {
    pub days: usize,
    pub computable_days: usize,
    pub years: usize,
    pub filled_days: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub latest_price: Option<Decimal>,
    pub latest_moving_average: Option<Decimal>,
    pub latest_day_change: Option<PriceChange>,
    pub files: Vec<PathBuf>,
}

impl PipelineStats {
    pub fn from_output(output: &PipelineOutput, files: Vec<PathBuf>) -> Self {
        let points = output.moving_averages.points();
        let latest = output.moving_averages.latest();
        Self {
            days: points.len(),
            computable_days: output.moving_averages.computable_count(),
            years: output.analytics.yearly.len(),
            filled_days: output.filled_days,
            first_date: points.first().map(|p| p.date),
            last_date: latest.map(|p| p.date),
            latest_price: latest.map(|p| p.price),
            latest_moving_average: latest.and_then(|p| p.moving_average),
            latest_day_change: output.analytics.daily.last().and_then(|d| d.day_change),
            files,
        }
    }
}
