//! Record loader: reads every configured price source and merges them into
//! one chronological `Series`.

pub mod parsers;

use crate::config::SourceConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{PriceRecord, RawDailyRow, RawHistoricalRow, Series, SourceKind, SourceRecord};
use chrono::NaiveDate;
use csv::StringRecord;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Records of a single source, checked for duplicate dates.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub name: String,
    pub records: Vec<PriceRecord>,
}

// ── Header mapping ────────────────────────────────────────────────────────────

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim();
        names.iter().any(|n| h.eq_ignore_ascii_case(n))
    })
}

fn require_column(headers: &StringRecord, names: &[&str], source_name: &str) -> PipelineResult<usize> {
    find_column(headers, names).ok_or_else(|| {
        PipelineError::malformed(source_name, 0, names[0], "", "required column missing from header")
    })
}

const PRICE_COLUMNS: [&str; 2] = ["Close", "Price"];
const ADJ_CLOSE_COLUMNS: [&str; 3] = ["AdjClose", "Adj Close", "Adj_Close"];

/// Optional open/high/low column positions.
#[derive(Clone, Copy)]
struct DayRange {
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
}

/// Column positions for one source layout.
enum Layout {
    Historical {
        month: usize,
        day: usize,
        year: usize,
        range: DayRange,
        price: usize,
        adj_close: Option<usize>,
        volume: usize,
    },
    Daily {
        date: usize,
        range: DayRange,
        price: usize,
        adj_close: Option<usize>,
        volume: usize,
    },
}

impl Layout {
    fn from_headers(kind: SourceKind, headers: &StringRecord, source_name: &str) -> PipelineResult<Self> {
        let price = require_column(headers, &PRICE_COLUMNS, source_name)?;
        let adj_close = find_column(headers, &ADJ_CLOSE_COLUMNS);
        let volume = require_column(headers, &["Volume"], source_name)?;
        let range = DayRange {
            open: find_column(headers, &["Open"]),
            high: find_column(headers, &["High"]),
            low: find_column(headers, &["Low"]),
        };

        Ok(match kind {
            SourceKind::Historical => Layout::Historical {
                month: require_column(headers, &["Month"], source_name)?,
                day: require_column(headers, &["Day"], source_name)?,
                year: require_column(headers, &["Year"], source_name)?,
                range,
                price,
                adj_close,
                volume,
            },
            SourceKind::Daily => Layout::Daily {
                date: require_column(headers, &["Date"], source_name)?,
                range,
                price,
                adj_close,
                volume,
            },
        })
    }

    fn extract(&self, record: &StringRecord) -> SourceRecord {
        let field = |i: usize| record.get(i).map(|s| s.to_string());
        match *self {
            Layout::Historical { month, day, year, range, price, adj_close, volume } => {
                SourceRecord::Historical(RawHistoricalRow {
                    month: field(month),
                    day: field(day),
                    year: field(year),
                    open: range.open.and_then(field),
                    high: range.high.and_then(field),
                    low: range.low.and_then(field),
                    price: field(price),
                    adj_close: adj_close.and_then(field),
                    volume: field(volume),
                })
            }
            Layout::Daily { date, range, price, adj_close, volume } => SourceRecord::Daily(RawDailyRow {
                date: field(date),
                open: range.open.and_then(field),
                high: range.high.and_then(field),
                low: range.low.and_then(field),
                price: field(price),
                adj_close: adj_close.and_then(field),
                volume: field(volume),
            }),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parse one source from any reader. Rows may be in any order.
pub fn read_source<R: Read>(
    reader: R,
    kind: SourceKind,
    delimiter: u8,
    source_name: &str,
) -> PipelineResult<LoadedSource> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let layout = Layout::from_headers(kind, &headers, source_name)?;

    let mut seen: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut records = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let row = i + 1;
        let record = result?;
        if record.iter().all(|f| f.is_empty()) {
            debug!("{}: skipping blank row {}", source_name, row);
            continue;
        }

        let price_record = layout.extract(&record).into_price_record(source_name, row)?;

        if let Some(&first_row) = seen.get(&price_record.date) {
            return Err(PipelineError::DuplicateDate {
                source_name: source_name.to_string(),
                date: price_record.date,
                first_row,
                second_row: row,
            });
        }
        seen.insert(price_record.date, row);
        records.push(price_record);
    }

    records.sort_by_key(|r| r.date);
    Ok(LoadedSource {
        name: source_name.to_string(),
        records,
    })
}

pub fn load_source(path: &Path, kind: SourceKind, delimiter: u8) -> PipelineResult<LoadedSource> {
    let name = path.display().to_string();
    debug!("Loading {:?} source from {}", kind, name);
    let file = std::fs::File::open(path)?;
    let loaded = read_source(file, kind, delimiter, &name)?;
    info!("{}: {} records loaded", name, loaded.records.len());
    Ok(loaded)
}

/// Merge sources listed in priority order. A date covered by several sources
/// keeps the earliest source's record, provided every price agrees within
/// `tolerance`.
pub fn merge_sources(sources: Vec<LoadedSource>, tolerance: Decimal) -> PipelineResult<Series> {
    let mut merged: BTreeMap<NaiveDate, (String, PriceRecord)> = BTreeMap::new();
    let mut overlaps = 0usize;

    for source in sources {
        for record in source.records {
            match merged.get(&record.date) {
                Some((first_source, existing)) => {
                    let diff = (existing.price - record.price).abs();
                    if diff > tolerance {
                        return Err(PipelineError::SourceOverlapConflict {
                            date: record.date,
                            first_source: first_source.clone(),
                            first_price: existing.price,
                            second_source: source.name.clone(),
                            second_price: record.price,
                            tolerance,
                        });
                    }
                    overlaps += 1;
                }
                None => {
                    merged.insert(record.date, (source.name.clone(), record));
                }
            }
        }
    }

    if overlaps > 0 {
        debug!("{} overlapping days reconciled", overlaps);
    }

    Series::new(merged.into_values().map(|(_, r)| r).collect())
}

/// Load every configured source and merge them.
pub fn load_all(sources: &[SourceConfig], tolerance: Decimal) -> PipelineResult<Series> {
    let mut loaded = Vec::with_capacity(sources.len());
    for source in sources {
        if !source.path.exists() && !source.required {
            warn!("Optional source {:?} not found, skipping", source.path);
            continue;
        }
        loaded.push(load_source(&source.path, source.kind, source.delimiter_byte())?);
    }

    let series = merge_sources(loaded, tolerance)?;
    info!(
        "Merged series: {} days ({:?} → {:?})",
        series.len(),
        series.first_date(),
        series.last_date()
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HISTORICAL: &str = "Month\tDay\tYear\tOpen\tHigh\tLow\tClose\tAdjClose\tVolume\n\
        Sep\t18\t2014\t456.86\t456.86\t413.10\t424.44\t424.44\t34,483,200\n\
        Sep\t17\t2014\t465.86\t468.17\t452.42\t457.33\t457.33\t21,056,800\n";

    fn daily(rows: &str) -> String {
        format!("Date,Close,AdjClose,Volume\n{rows}")
    }

    #[test]
    fn reads_newest_first_historical_file_in_date_order() {
        let src = read_source(HISTORICAL.as_bytes(), SourceKind::Historical, b'\t', "hist").unwrap();
        assert_eq!(src.records.len(), 2);
        assert_eq!(src.records[0].date, NaiveDate::from_ymd_opt(2014, 9, 17).unwrap());
        assert_eq!(src.records[0].price, dec!(457.33));
        assert_eq!(src.records[0].open, Some(dec!(465.86)));
        assert_eq!(src.records[0].high, Some(dec!(468.17)));
        assert_eq!(src.records[0].low, Some(dec!(452.42)));
        assert_eq!(src.records[1].volume, 34_483_200);
    }

    #[test]
    fn duplicate_date_in_one_source_is_rejected() {
        let data = daily("2014-09-17,457.33,457.33,1\n2014-09-17,457.33,457.33,1\n");
        let err = read_source(data.as_bytes(), SourceKind::Daily, b',', "daily").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DuplicateDate { first_row: 1, second_row: 2, .. }
        ));
    }

    #[test]
    fn missing_column_is_reported_at_row_zero() {
        let data = "Date,Close\n2014-09-17,457.33\n";
        let err = read_source(data.as_bytes(), SourceKind::Daily, b',', "daily").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { row: 0, .. }));
    }

    #[test]
    fn malformed_row_names_source_and_row() {
        let data = daily("2014-09-17,457.33,,1\n2014-09-18,4,24.44,,1\n");
        let err = read_source(data.as_bytes(), SourceKind::Daily, b',', "daily.csv").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("daily.csv"), "{msg}");
        assert!(msg.contains("row 2"), "{msg}");
    }

    #[test]
    fn oversized_prices_fail_at_load() {
        let data = daily("2015-01-01,100000000000000000000000000.00,,1\n");
        let err = read_source(data.as_bytes(), SourceKind::Daily, b',', "daily").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { row: 1, .. }));
    }

    #[test]
    fn overlapping_sources_within_tolerance_merge() {
        let hist = read_source(HISTORICAL.as_bytes(), SourceKind::Historical, b'\t', "hist").unwrap();
        let data = daily("2014-09-17,457.34,457.34,1\n2014-09-19,394.80,394.80,1\n");
        let recent = read_source(data.as_bytes(), SourceKind::Daily, b',', "daily").unwrap();

        let series = merge_sources(vec![hist, recent], dec!(0.01)).unwrap();
        assert_eq!(series.len(), 3);
        // earlier-listed source wins
        assert_eq!(series.records()[0].price, dec!(457.33));
        assert_eq!(series.records()[0].volume, 21_056_800);
    }

    #[test]
    fn overlapping_sources_beyond_tolerance_conflict() {
        let hist = read_source(HISTORICAL.as_bytes(), SourceKind::Historical, b'\t', "hist").unwrap();
        let data = daily("2014-09-17,460.00,460.00,1\n");
        let recent = read_source(data.as_bytes(), SourceKind::Daily, b',', "daily").unwrap();

        let err = merge_sources(vec![hist, recent], dec!(0.01)).unwrap_err();
        match err {
            PipelineError::SourceOverlapConflict { date, first_price, second_price, .. } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2014, 9, 17).unwrap());
                assert_eq!(first_price, dec!(457.33));
                assert_eq!(second_price, dec!(460.00));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn load_all_skips_missing_optional_source() {
        let dir = tempfile::tempdir().unwrap();
        let hist_path = dir.path().join("historical_data.tsv");
        std::fs::write(&hist_path, HISTORICAL).unwrap();

        let sources = vec![
            SourceConfig {
                path: hist_path,
                kind: SourceKind::Historical,
                delimiter: None,
                required: true,
            },
            SourceConfig {
                path: dir.path().join("absent.csv"),
                kind: SourceKind::Daily,
                delimiter: None,
                required: false,
            },
        ];
        let series = load_all(&sources, dec!(0.01)).unwrap();
        assert_eq!(series.len(), 2);
    }
}
