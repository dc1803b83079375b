pub mod http_client;
pub mod yahoo;

use crate::config::SourceConfig;
use crate::loader::load_source;
use crate::models::{PriceRecord, SourceKind};
use crate::output::fmt_cents;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub use self::yahoo::YahooChartSource;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable daily price provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_daily(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceRecord>>;
}

// ── Daily source maintenance ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct UpdateStats {
    pub fetched: usize,
    pub added: usize,
    pub replaced: usize,
    pub total: usize,
}

/// First day to request: the day before the last stored one (the latest bar is
/// usually partial), or `lookback_days` back when nothing is stored yet.
pub fn fetch_start(last_stored: Option<NaiveDate>, today: NaiveDate, lookback_days: u32) -> NaiveDate {
    let lookback = today
        .checked_sub_days(Days::new(u64::from(lookback_days)))
        .unwrap_or(today);
    match last_stored {
        Some(last) => last.pred_opt().unwrap_or(last).min(today),
        None => lookback,
    }
}

/// Last date held by any configured source other than the daily file itself.
/// Missing optional sources are skipped.
pub fn covered_until(sources: &[SourceConfig], daily_path: &Path) -> Result<Option<NaiveDate>> {
    let mut last = None;
    for source in sources.iter().filter(|s| s.path != daily_path) {
        if !source.path.exists() && !source.required {
            continue;
        }
        let loaded = load_source(&source.path, source.kind, source.delimiter_byte())
            .with_context(|| format!("Failed to read {:?}", source.path))?;
        last = last.max(loaded.records.iter().map(|r| r.date).max());
    }
    Ok(last)
}

/// Fetch recent bars from `source` and fold them into the daily CSV at `path`.
/// Fetched values replace stored ones for the same date. Days up to
/// `covered_until` belong to other sources and are neither requested nor stored.
pub async fn update_daily_source(
    source: &dyn PriceSource,
    path: &Path,
    covered_until: Option<NaiveDate>,
    today: NaiveDate,
    lookback_days: u32,
    force_lookback: bool,
) -> Result<UpdateStats> {
    let mut stored: BTreeMap<NaiveDate, PriceRecord> = if path.exists() {
        load_source(path, SourceKind::Daily, SourceKind::Daily.default_delimiter())
            .with_context(|| format!("Failed to read {:?}", path))?
            .records
            .into_iter()
            .map(|r| (r.date, r))
            .collect()
    } else {
        BTreeMap::new()
    };

    let resume_from = if force_lookback {
        None
    } else {
        stored.keys().next_back().copied().max(covered_until)
    };
    let start = fetch_start(resume_from, today, lookback_days);
    debug!("{}: requesting {} → {}", source.name(), start, today);

    let fetched = source.fetch_daily(start, today).await?;
    let mut added = 0usize;
    let mut replaced = 0usize;
    for record in fetched.iter().filter(|r| covered_until.is_none_or(|c| r.date > c)) {
        match stored.insert(record.date, record.clone()) {
            Some(_) => replaced += 1,
            None => added += 1,
        }
    }

    write_daily_file(path, stored.values())?;
    info!(
        "{}: {} fetched, {} added, {} replaced, {} stored",
        path.display(),
        fetched.len(),
        added,
        replaced,
        stored.len()
    );

    Ok(UpdateStats {
        fetched: fetched.len(),
        added,
        replaced,
        total: stored.len(),
    })
}

/// Rewrite the daily source oldest-first through a temp file.
pub fn write_daily_file<'a>(path: &Path, records: impl Iterator<Item = &'a PriceRecord>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(["Date", "Open", "High", "Low", "Close", "AdjClose", "Volume"])?;
    for r in records {
        writer.write_record([
            r.date.format("%Y-%m-%d").to_string(),
            r.open.map(fmt_cents).unwrap_or_default(),
            r.high.map(fmt_cents).unwrap_or_default(),
            r.low.map(fmt_cents).unwrap_or_default(),
            fmt_cents(r.price),
            r.adjusted_close.map(fmt_cents).unwrap_or_default(),
            r.volume.to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to flush daily CSV")?;

    let tmp = path.with_extension("csv.tmp");
    std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {:?}", tmp))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}
