//! Gap/continuity normalizer.
//!
//! Guarantees that consecutive records are exactly one calendar day apart,
//! either by rejecting the series or by carrying the last price forward.

use crate::config::GapPolicy;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{PriceRecord, Series};
use chrono::NaiveDate;
use tracing::{info, warn};

/// Earliest date the output schema accepts.
pub fn min_output_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2009, 1, 13).unwrap_or(NaiveDate::MIN)
}

pub fn normalize(series: Series, policy: GapPolicy) -> PipelineResult<Series> {
    if series.is_empty() {
        return Err(PipelineError::UnresolvableGap {
            reason: "series is empty".to_string(),
        });
    }
    let first = series.first_date().unwrap_or(NaiveDate::MIN);
    if first < min_output_date() {
        return Err(PipelineError::UnresolvableGap {
            reason: format!("series starts on {first}, before {}", min_output_date()),
        });
    }

    let mut out: Vec<PriceRecord> = Vec::with_capacity(series.len());
    let mut filled = 0usize;

    for record in series.into_records() {
        if let Some(prev) = out.last() {
            let missing = (record.date - prev.date).num_days() - 1;
            if missing > 0 {
                match policy {
                    GapPolicy::Reject => {
                        return Err(PipelineError::UnresolvableGap {
                            reason: format!(
                                "{missing} day(s) missing between {} and {}",
                                prev.date, record.date
                            ),
                        });
                    }
                    GapPolicy::CarryForward => {
                        warn!(
                            "Filling {} day(s) between {} and {} with {}",
                            missing, prev.date, record.date, prev.price
                        );
                        let template = prev.clone();
                        for date in template.date.iter_days().skip(1).take(missing as usize) {
                            out.push(PriceRecord {
                                date,
                                open: None,
                                high: None,
                                low: None,
                                volume: 0,
                                filled: true,
                                ..template.clone()
                            });
                        }
                        filled += missing as usize;
                    }
                }
            }
        }
        out.push(record);
    }

    if filled > 0 {
        info!("Normalizer filled {} missing day(s)", filled);
    }
    Series::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series(dates: &[NaiveDate]) -> Series {
        let records = dates
            .iter()
            .enumerate()
            .map(|(i, &d)| PriceRecord::new(d, dec!(100.00) + rust_decimal::Decimal::from(i)))
            .collect();
        Series::new(records).unwrap()
    }

    #[test]
    fn contiguous_series_passes_untouched() {
        let s = series(&[day(2015, 1, 1), day(2015, 1, 2), day(2015, 1, 3)]);
        let out = normalize(s.clone(), GapPolicy::Reject).unwrap();
        assert_eq!(out, s);
    }

    #[test]
    fn gap_is_rejected_by_default_policy() {
        let s = series(&[day(2015, 1, 1), day(2015, 1, 3)]);
        let err = normalize(s, GapPolicy::default()).unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvableGap { .. }));
    }

    #[test]
    fn carry_forward_fills_each_missing_day() {
        let s = series(&[day(2015, 1, 1), day(2015, 1, 4)]);
        let out = normalize(s, GapPolicy::CarryForward).unwrap();
        let recs = out.records();
        assert_eq!(recs.len(), 4);
        assert!(recs.windows(2).all(|w| (w[1].date - w[0].date).num_days() == 1));
        assert!(recs[1].filled && recs[2].filled);
        assert_eq!(recs[2].price, dec!(100.00));
        assert_eq!(recs[2].volume, 0);
        assert_eq!(recs[3].price, dec!(101.00));
        assert!(!recs[3].filled);
    }

    #[test]
    fn start_before_schema_minimum_is_unresolvable() {
        let s = series(&[day(2009, 1, 12), day(2009, 1, 13)]);
        let err = normalize(s, GapPolicy::CarryForward).unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvableGap { .. }));
    }

    #[test]
    fn empty_series_is_unresolvable() {
        assert!(normalize(Series::default(), GapPolicy::CarryForward).is_err());
    }
}
