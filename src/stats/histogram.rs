//! Equi-depth histograms over index leading-field values

use std::ops::Bound;

use serde::{Deserialize, Serialize};

use super::errors::{EstimationError, EstimationResult};
use crate::value::{Value, ValueTag};

/// One histogram bucket covering `[lower, upper]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub lower: Value,
    pub upper: Value,
    pub count: u64,
    pub distinct_count: u64,
}

impl Bucket {
    pub fn new(lower: impl Into<Value>, upper: impl Into<Value>, count: u64, distinct_count: u64) -> Self {
        Self {
            lower: lower.into(),
            upper: upper.into(),
            count,
            distinct_count,
        }
    }

    /// Fraction of the bucket's rows estimated to fall in the range
    fn overlap(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> f64 {
        let below = match lower {
            Bound::Included(l) => self.upper < *l,
            Bound::Excluded(l) => self.upper <= *l,
            Bound::Unbounded => false,
        };
        let above = match upper {
            Bound::Included(u) => self.lower > *u,
            Bound::Excluded(u) => self.lower >= *u,
            Bound::Unbounded => false,
        };
        if below || above {
            return 0.0;
        }

        let lower_inside = match lower {
            Bound::Included(l) => self.lower >= *l,
            Bound::Excluded(l) => self.lower > *l,
            Bound::Unbounded => true,
        };
        let upper_inside = match upper {
            Bound::Included(u) => self.upper <= *u,
            Bound::Excluded(u) => self.upper < *u,
            Bound::Unbounded => true,
        };
        if lower_inside && upper_inside {
            return 1.0;
        }

        // partial overlap: interpolate numerically where possible
        let (Some(bl), Some(bu)) = (self.lower.as_f64(), self.upper.as_f64()) else {
            return 0.5;
        };
        let width = bu - bl;
        if width <= 0.0 {
            return 1.0;
        }
        let lo = match lower {
            Bound::Included(l) | Bound::Excluded(l) => l.as_f64().map_or(bl, |l| l.max(bl)),
            Bound::Unbounded => bl,
        };
        let hi = match upper {
            Bound::Included(u) | Bound::Excluded(u) => u.as_f64().map_or(bu, |u| u.min(bu)),
            Bound::Unbounded => bu,
        };
        ((hi - lo) / width).clamp(0.0, 1.0)
    }
}

/// Ordered, non-overlapping buckets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Histogram {
    pub buckets: Vec<Bucket>,
}

impl Histogram {
    pub fn new(buckets: Vec<Bucket>) -> Self {
        Self { buckets }
    }

    /// Build an equi-depth histogram from sorted values.
    ///
    /// Equal values never straddle a bucket boundary, so a run of equal
    /// values can yield fewer buckets than asked for. No values, or a
    /// `bucket_count` of 0, gives an empty histogram, which statistics
    /// snapshots skip so estimates fall back to the defaults.
    pub fn from_sorted(values: &[Value], bucket_count: usize) -> Self {
        if values.is_empty() || bucket_count == 0 {
            return Self::default();
        }
        let depth = values.len().div_ceil(bucket_count).max(1);
        let mut buckets = Vec::with_capacity(bucket_count);
        let mut start = 0;

        while start < values.len() {
            let mut end = (start + depth).min(values.len());
            while end < values.len() && values[end] == values[end - 1] {
                end += 1;
            }
            let slice = &values[start..end];
            let distinct = 1 + slice.windows(2).filter(|w| w[0] != w[1]).count();
            buckets.push(Bucket {
                lower: slice[0].clone(),
                upper: slice[slice.len() - 1].clone(),
                count: slice.len() as u64,
                distinct_count: distinct as u64,
            });
            start = end;
        }
        Self { buckets }
    }

    /// Rows described by the histogram
    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum()
    }

    /// Tag shared by every bucket bound, ignoring `Null`
    pub fn value_tag(&self) -> Option<ValueTag> {
        self.buckets
            .iter()
            .flat_map(|b| [&b.lower, &b.upper])
            .find(|v| !v.is_null())
            .map(Value::tag)
    }

    /// Check ordering, overlap and count consistency
    pub fn validate(&self, index: &str) -> EstimationResult<()> {
        let corrupt = |reason: String| EstimationError::CorruptHistogram {
            index: index.to_string(),
            reason,
        };

        let tag = self.value_tag();
        for (i, bucket) in self.buckets.iter().enumerate() {
            if bucket.lower > bucket.upper {
                return Err(corrupt(format!("bucket {} has lower above upper", i)));
            }
            if bucket.distinct_count > bucket.count {
                return Err(corrupt(format!("bucket {} has more distinct values than rows", i)));
            }
            if bucket.count > 0 && bucket.distinct_count == 0 {
                return Err(corrupt(format!("bucket {} has rows but no distinct values", i)));
            }
            for bound in [&bucket.lower, &bucket.upper] {
                if !bound.is_null() && Some(bound.tag()) != tag {
                    return Err(corrupt(format!("bucket {} mixes value types", i)));
                }
            }
        }
        for (i, pair) in self.buckets.windows(2).enumerate() {
            if pair[0].upper >= pair[1].lower {
                return Err(corrupt(format!("buckets {} and {} overlap", i, i + 1)));
            }
        }
        Ok(())
    }

    /// Estimated fraction of rows equal to `value`
    pub fn equality_selectivity(&self, value: &Value) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.buckets
            .iter()
            .find(|b| b.lower <= *value && *value <= b.upper)
            .map_or(0.0, |b| {
                (b.count as f64 / b.distinct_count.max(1) as f64) / total as f64
            })
    }

    /// Estimated fraction of rows within the bounds
    pub fn range_selectivity(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let rows: f64 = self
            .buckets
            .iter()
            .map(|b| b.count as f64 * b.overlap(lower, upper))
            .sum();
        (rows / total as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ages() -> Histogram {
        Histogram::new(vec![
            Bucket::new(0, 9, 100, 10),
            Bucket::new(10, 19, 300, 10),
            Bucket::new(20, 99, 600, 80),
        ])
    }

    #[test]
    fn test_valid_histogram() {
        ages().validate("by_age").unwrap();
        assert_eq!(ages().total(), 1000);
    }

    #[test]
    fn test_overlap_rejected() {
        let hist = Histogram::new(vec![Bucket::new(0, 10, 5, 5), Bucket::new(10, 20, 5, 5)]);
        assert!(matches!(
            hist.validate("idx"),
            Err(EstimationError::CorruptHistogram { .. })
        ));
    }

    #[test]
    fn test_mixed_types_rejected() {
        let hist = Histogram::new(vec![Bucket::new(0, 10, 5, 5), Bucket::new("a", "b", 5, 5)]);
        assert!(hist.validate("idx").is_err());
    }

    #[test]
    fn test_equality_selectivity() {
        let hist = ages();
        assert!((hist.equality_selectivity(&Value::Int(15)) - 0.03).abs() < 1e-9);
        assert_eq!(hist.equality_selectivity(&Value::Int(500)), 0.0);
    }

    #[test]
    fn test_range_selectivity() {
        let hist = ages();
        let all = hist.range_selectivity(Bound::Unbounded, Bound::Unbounded);
        assert!((all - 1.0).abs() < 1e-9);

        let teens = hist.range_selectivity(
            Bound::Included(&Value::Int(10)),
            Bound::Included(&Value::Int(19)),
        );
        assert!((teens - 0.3).abs() < 1e-9);

        let half_first = hist.range_selectivity(Bound::Unbounded, Bound::Excluded(&Value::Int(5)));
        assert!(half_first > 0.0 && half_first < 0.1);
    }

    #[test]
    fn test_from_sorted_keeps_duplicates_together() {
        let values: Vec<Value> = [1, 1, 1, 2, 3, 3, 4, 5].iter().map(|v| Value::Int(*v)).collect();
        let hist = Histogram::from_sorted(&values, 4);
        hist.validate("idx").unwrap();
        assert_eq!(hist.total(), 8);
        assert_eq!(hist.buckets[0].lower, Value::Int(1));
        assert_eq!(hist.buckets[0].upper, Value::Int(1));
    }

    #[test]
    fn test_from_sorted_without_buckets_is_empty() {
        let values: Vec<Value> = (0..10).map(Value::Int).collect();
        let hist = Histogram::from_sorted(&values, 0);
        assert!(hist.buckets.is_empty());
        assert_eq!(hist.total(), 0);
        assert!(Histogram::from_sorted(&[], 4).buckets.is_empty());
    }
}
