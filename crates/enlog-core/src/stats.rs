//! Rank-based statistics over decoded measurement records.
//!
//! The percentile definition here is nearest-rank-above: the value at index
//! `ceil(rank * (n - 1))` of the ascending-sorted sample. It is part of the
//! output contract and must not be replaced with linear interpolation.

use serde::{Deserialize, Serialize};

use crate::error::{EnlogError, Result};

// ── Percentiles ───────────────────────────────────────────────────────────────

/// The fixed percentile set computed for every tracked field.
///
/// All slots are `None` when the input collection was empty; otherwise all
/// slots are `Some` and satisfy `min <= p10 <= p50 <= p90 <= p99 <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub min: Option<f64>,
    pub p10: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p99: Option<f64>,
    pub max: Option<f64>,
}

/// Select the nearest-rank-above element of a sorted, non-empty sample.
fn nearest_rank(sorted: &[f64], rank: f64) -> f64 {
    let last_index = sorted.len() - 1;
    let index = (rank * last_index as f64).ceil() as usize;
    sorted[index]
}

/// Compute the fixed percentile set of `field` across `records`.
///
/// Empty input degrades to an all-`None` result rather than indexing past
/// the end of the sample.
pub fn percentiles<T>(records: &[T], field: impl Fn(&T) -> f64) -> Percentiles {
    if records.is_empty() {
        return Percentiles {
            min: None,
            p10: None,
            p50: None,
            p90: None,
            p99: None,
            max: None,
        };
    }

    let mut sorted: Vec<f64> = records.iter().map(field).collect();
    sorted.sort_by(f64::total_cmp);

    Percentiles {
        min: Some(nearest_rank(&sorted, 0.0)),
        p10: Some(nearest_rank(&sorted, 0.10)),
        p50: Some(nearest_rank(&sorted, 0.50)),
        p90: Some(nearest_rank(&sorted, 0.90)),
        p99: Some(nearest_rank(&sorted, 0.99)),
        max: Some(nearest_rank(&sorted, 1.0)),
    }
}

// ── Scalar reductions ─────────────────────────────────────────────────────────

/// Arithmetic mean of `field` across `records`.
///
/// Unlike [`percentiles`], an empty collection is an error here; the
/// asymmetry is part of the output contract.
pub fn average<T>(records: &[T], field: impl Fn(&T) -> f64) -> Result<f64> {
    if records.is_empty() {
        return Err(EnlogError::EmptyAverage);
    }
    let sum: f64 = records.iter().map(&field).sum();
    Ok(sum / records.len() as f64)
}

/// Smallest `field` value, `None` for empty input.
pub fn min_value<T>(records: &[T], field: impl Fn(&T) -> f64) -> Option<f64> {
    records.iter().map(field).reduce(f64::min)
}

/// Largest `field` value, `None` for empty input.
pub fn max_value<T>(records: &[T], field: impl Fn(&T) -> f64) -> Option<f64> {
    records.iter().map(field).reduce(f64::max)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn values(v: &[f64]) -> Vec<f64> {
        v.to_vec()
    }

    // ── percentiles ───────────────────────────────────────────────────────────

    #[test]
    fn test_percentiles_empty_is_all_none() {
        let p = percentiles(&values(&[]), |v| *v);
        assert_eq!(p.min, None);
        assert_eq!(p.p10, None);
        assert_eq!(p.p50, None);
        assert_eq!(p.p90, None);
        assert_eq!(p.p99, None);
        assert_eq!(p.max, None);
    }

    #[test]
    fn test_percentiles_single_element() {
        let p = percentiles(&values(&[42.0]), |v| *v);
        assert_eq!(p.min, Some(42.0));
        assert_eq!(p.p50, Some(42.0));
        assert_eq!(p.max, Some(42.0));
    }

    #[test]
    fn test_percentiles_nearest_rank_ten_elements() {
        // last_index = 9:
        //   p10 → ceil(0.9)  = index 1 → 2
        //   p50 → ceil(4.5)  = index 5 → 6
        //   p90 → ceil(8.1)  = index 9 → 10
        //   p99 → ceil(8.91) = index 9 → 10
        let sample: Vec<f64> = (1..=10).map(f64::from).collect();
        let p = percentiles(&sample, |v| *v);
        assert_eq!(p.min, Some(1.0));
        assert_eq!(p.p10, Some(2.0));
        assert_eq!(p.p50, Some(6.0));
        assert_eq!(p.p90, Some(10.0));
        assert_eq!(p.p99, Some(10.0));
        assert_eq!(p.max, Some(10.0));
    }

    #[test]
    fn test_percentiles_no_interpolation_on_even_count() {
        // A linear-interpolation p50 of [1,2,3,4] would be 2.5; nearest-rank
        // selects ceil(0.5 * 3) = index 2 → 3.
        let p = percentiles(&values(&[1.0, 2.0, 3.0, 4.0]), |v| *v);
        assert_eq!(p.p50, Some(3.0));
    }

    #[test]
    fn test_percentiles_unsorted_input() {
        let p = percentiles(&values(&[5.0, 1.0, 3.0]), |v| *v);
        assert_eq!(p.min, Some(1.0));
        assert_eq!(p.max, Some(5.0));
    }

    #[test]
    fn test_percentiles_ordering_property() {
        let sample = values(&[12.5, 0.0, 7.25, 99.9, 7.25, 3.0, 54.0]);
        let p = percentiles(&sample, |v| *v);
        let seq = [p.min, p.p10, p.p50, p.p90, p.p99, p.max];
        for pair in seq.windows(2) {
            assert!(pair[0].unwrap() <= pair[1].unwrap(), "{:?}", seq);
        }
    }

    // ── average / min / max ───────────────────────────────────────────────────

    #[test]
    fn test_average() {
        let avg = average(&values(&[1.0, 2.0, 3.0, 4.0]), |v| *v).unwrap();
        assert!((avg - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_average_empty_fails() {
        let err = average(&values(&[]), |v| *v).unwrap_err();
        assert!(matches!(err, EnlogError::EmptyAverage));
    }

    #[test]
    fn test_min_max() {
        let sample = values(&[3.0, 1.0, 2.0]);
        assert_eq!(min_value(&sample, |v| *v), Some(1.0));
        assert_eq!(max_value(&sample, |v| *v), Some(3.0));
    }

    #[test]
    fn test_min_max_empty_is_none() {
        assert_eq!(min_value(&values(&[]), |v| *v), None);
        assert_eq!(max_value(&values(&[]), |v| *v), None);
    }

    #[test]
    fn test_field_selector_extracts_column() {
        struct Row {
            watts: f64,
        }
        let rows = [Row { watts: 10.0 }, Row { watts: 30.0 }];
        let avg = average(&rows, |r| r.watts).unwrap();
        assert!((avg - 20.0).abs() < 1e-9);
    }
}
