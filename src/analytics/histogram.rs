use crate::error::{PipelineError, PipelineResult};
use crate::models::{HistogramBucket, MovingAveragePoint};
use rust_decimal::Decimal;

pub const TOTAL_LABEL: &str = "Total Days";

/// Fixed-width deviation buckets `[k, k+width)` from `-bound` to `bound`,
/// plus an open tail on each side.
#[derive(Debug, Clone)]
pub struct HistogramSpec {
    width: u32,
    bound: u32,
    lower_bounds: Vec<i64>,
}

impl HistogramSpec {
    pub fn new(width: u32, bound: u32) -> PipelineResult<Self> {
        if width == 0 || bound == 0 || bound % width != 0 {
            return Err(PipelineError::InvalidSettings(format!(
                "histogram bound {bound} must be a positive multiple of width {width}"
            )));
        }
        let b = i64::from(bound);
        let lower_bounds = (-b..b).step_by(width as usize).collect();
        Ok(Self { width, bound, lower_bounds })
    }

    pub fn below_label(&self) -> String {
        format!("Below -{}%", self.bound)
    }

    pub fn above_label(&self) -> String {
        format!("Above {}%", self.bound)
    }

    /// Labels of every counting bucket, in ascending order.
    pub fn labels(&self) -> Vec<String> {
        let w = i64::from(self.width);
        let mut labels = Vec::with_capacity(self.lower_bounds.len() + 2);
        labels.push(self.below_label());
        for &k in &self.lower_bounds {
            labels.push(format!("{}% to {}%", k, k + w));
        }
        labels.push(self.above_label());
        labels
    }

    /// Index into `labels()` for a deviation percentage.
    pub fn bucket_index(&self, deviation_pct: Decimal) -> usize {
        let bound = Decimal::from(self.bound);
        if deviation_pct < -bound {
            0
        } else if deviation_pct >= bound {
            self.lower_bounds.len() + 1
        } else {
            // number of lower bounds ≤ deviation, at least 1 here
            self.lower_bounds
                .partition_point(|&lb| Decimal::from(lb) <= deviation_pct)
        }
    }

    /// Count every computable day into its bucket and append the total row.
    pub fn build(&self, points: &[MovingAveragePoint]) -> PipelineResult<Vec<HistogramBucket>> {
        let labels = self.labels();
        let mut counts = vec![0usize; labels.len()];
        for point in points {
            if let Some(dev) = point.deviation_pct()? {
                counts[self.bucket_index(dev)] += 1;
            }
        }

        let total: usize = counts.iter().sum();
        let mut buckets: Vec<HistogramBucket> = labels
            .into_iter()
            .zip(counts)
            .map(|(label, day_count)| HistogramBucket { label, day_count })
            .collect();
        buckets.push(HistogramBucket {
            label: TOTAL_LABEL.to_string(),
            day_count: total,
        });
        Ok(buckets)
    }
}

/// True for `Below -B%`, `N% to M%`, `Above B%` or `Total Days`.
pub fn is_valid_label(label: &str) -> bool {
    fn is_int(s: &str) -> bool {
        let digits = s.strip_prefix('-').unwrap_or(s);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    }

    if label == TOTAL_LABEL {
        return true;
    }
    if let Some(rest) = label.strip_prefix("Below -").and_then(|r| r.strip_suffix('%')) {
        return !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit());
    }
    if let Some(rest) = label.strip_prefix("Above ").and_then(|r| r.strip_suffix('%')) {
        return !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit());
    }
    match label.split_once("% to ") {
        Some((lo, hi)) => hi.strip_suffix('%').is_some_and(|hi| is_int(lo) && is_int(hi)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn spec() -> HistogramSpec {
        HistogramSpec::new(3, 18).unwrap()
    }

    fn point(price: Decimal, ma: Option<Decimal>) -> MovingAveragePoint {
        MovingAveragePoint {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            price,
            moving_average: ma,
        }
    }

    #[test]
    fn labels_are_symmetric_and_contiguous() {
        let labels = spec().labels();
        assert_eq!(labels.len(), 14);
        assert_eq!(labels[0], "Below -18%");
        assert_eq!(labels[1], "-18% to -15%");
        assert_eq!(labels[6], "-3% to 0%");
        assert_eq!(labels[7], "0% to 3%");
        assert_eq!(labels[12], "15% to 18%");
        assert_eq!(labels[13], "Above 18%");
        assert!(labels.iter().all(|l| is_valid_label(l)));
    }

    #[test]
    fn bucket_edges_are_half_open() {
        let s = spec();
        assert_eq!(s.bucket_index(dec!(-18.01)), 0);
        assert_eq!(s.bucket_index(dec!(-18)), 1);
        assert_eq!(s.bucket_index(dec!(-0.0001)), 6);
        assert_eq!(s.bucket_index(dec!(0)), 7);
        assert_eq!(s.bucket_index(dec!(17.999)), 12);
        assert_eq!(s.bucket_index(dec!(18)), 13);
        assert_eq!(s.bucket_index(dec!(250)), 13);
    }

    #[test]
    fn build_counts_only_computable_days() {
        let points = vec![
            point(dec!(110.00), Some(dec!(100.00))), // +10%
            point(dec!(50.00), Some(dec!(100.00))),  // -50%
            point(dec!(100.00), Some(dec!(100.00))), // 0%
            point(dec!(100.00), None),
        ];
        let buckets = spec().build(&points).unwrap();
        let find = |l: &str| buckets.iter().find(|b| b.label == l).unwrap().day_count;
        assert_eq!(find("9% to 12%"), 1);
        assert_eq!(find("Below -18%"), 1);
        assert_eq!(find("0% to 3%"), 1);
        assert_eq!(find(TOTAL_LABEL), 3);
        assert_eq!(buckets.last().unwrap().label, TOTAL_LABEL);
    }

    #[test]
    fn rejects_bound_not_divisible_by_width() {
        assert!(HistogramSpec::new(5, 18).is_err());
        assert!(HistogramSpec::new(0, 18).is_err());
        assert!(HistogramSpec::new(5, 20).is_ok());
    }

    #[test]
    fn label_grammar() {
        assert!(is_valid_label("Below -18%"));
        assert!(is_valid_label("5% to 10%"));
        assert!(is_valid_label("-10% to -5%"));
        assert!(is_valid_label("Total Days"));
        assert!(!is_valid_label("Below 18%"));
        assert!(!is_valid_label("5 to 10%"));
        assert!(!is_valid_label("5% to 10"));
        assert!(!is_valid_label("total days"));
    }

    proptest! {
        #[test]
        fn total_row_equals_sum_of_buckets(
            cents in prop::collection::vec((1i64..1_000_000, 1i64..1_000_000), 0..200)
        ) {
            let points: Vec<_> = cents
                .iter()
                .map(|&(p, m)| point(Decimal::new(p, 2), Some(Decimal::new(m, 2))))
                .collect();
            let buckets = spec().build(&points).unwrap();
            let (total, rest) = buckets.split_last().unwrap();
            prop_assert_eq!(total.day_count, rest.iter().map(|b| b.day_count).sum::<usize>());
            prop_assert_eq!(total.day_count, points.len());
        }
    }
}
