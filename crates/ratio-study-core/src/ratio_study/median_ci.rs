//! Distribution-free confidence interval for a median.
//!
//! The bounds come from the binomial sign test around the median, so they
//! are order statistics of the sample: both `low` and `high` are always
//! values that occur in the data, never interpolated between neighbours.

use super::central_tendency::sorted_copy;
use crate::types::ConfidenceInterval;

pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Normal critical value for the two supported confidence levels. Exactly
/// 0.90 selects 1.64; anything else is treated as 0.95.
pub fn z_for_confidence(confidence: f64) -> f64 {
    if confidence == 0.90 {
        1.64
    } else {
        1.96
    }
}

/// Whether `confidence` is one of the two levels with a dedicated z value.
pub fn is_supported_confidence(confidence: f64) -> bool {
    confidence == 0.90 || confidence == 0.95
}

/// 1-based `(lower, upper)` ranks of the interval bounds in a sorted sample
/// of size `n`, already clamped to `[1, n]`. `None` when `n == 0`.
pub fn order_statistic_ranks(n: usize, confidence: f64) -> Option<(usize, usize)> {
    if n == 0 {
        return None;
    }
    let z = z_for_confidence(confidence);
    let mut r_base = z * (n as f64).sqrt() / 2.0;
    if n % 2 == 0 {
        r_base += 0.5;
    }
    let r = r_base.ceil() as i64;
    let n_i = n as i64;

    let (lower, upper) = if n % 2 == 1 {
        let m = (n_i + 1) / 2;
        (m - r, m + r)
    } else {
        (n_i / 2 + 1 - r, n_i / 2 + r)
    };

    let clamp = |rank: i64| rank.clamp(1, n_i) as usize;
    Some((clamp(lower), clamp(upper)))
}

/// Confidence interval for the median of `values`. Non-finite and
/// non-positive values are discarded first; an empty remainder has no
/// interval.
pub fn median_ci(values: &[f64], confidence: f64) -> Option<ConfidenceInterval> {
    let kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    let sorted = sorted_copy(&kept);
    let (lower, upper) = order_statistic_ranks(sorted.len(), confidence)?;
    Some(ConfidenceInterval {
        low: sorted[lower - 1],
        high: sorted[upper - 1],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_z_values() {
        assert_eq!(z_for_confidence(0.90), 1.64);
        assert_eq!(z_for_confidence(0.95), 1.96);
        assert_eq!(z_for_confidence(0.99), 1.96);
    }

    #[test]
    fn test_ranks_odd_sample() {
        // n = 25: r = ceil(1.96 * 5 / 2) = ceil(4.9) = 5, m = 13
        assert_eq!(order_statistic_ranks(25, 0.95), Some((8, 18)));
        // 90%: r = ceil(1.64 * 5 / 2) = ceil(4.1) = 5
        assert_eq!(order_statistic_ranks(25, 0.90), Some((8, 18)));
    }

    #[test]
    fn test_ranks_even_sample() {
        // n = 100: r = ceil(9.8 + 0.5) = 11 -> (51 - 11, 50 + 11)
        assert_eq!(order_statistic_ranks(100, 0.95), Some((40, 61)));
        // 90%: r = ceil(8.2 + 0.5) = 9
        assert_eq!(order_statistic_ranks(100, 0.90), Some((42, 59)));
    }

    #[test]
    fn test_ranks_clamp_for_tiny_samples() {
        assert_eq!(order_statistic_ranks(1, 0.95), Some((1, 1)));
        assert_eq!(order_statistic_ranks(2, 0.95), Some((1, 2)));
        assert_eq!(order_statistic_ranks(3, 0.95), Some((1, 3)));
        assert_eq!(order_statistic_ranks(0, 0.95), None);
    }

    #[test]
    fn test_interval_bounds_are_sample_values() {
        let values: Vec<f64> = (1..=25).map(|i| i as f64 / 10.0).collect();
        let ci = median_ci(&values, 0.95).unwrap();
        assert_eq!(ci.low, 0.8);
        assert_eq!(ci.high, 1.8);
        assert!(values.contains(&ci.low));
        assert!(values.contains(&ci.high));
    }

    #[test]
    fn test_identical_values_collapse_interval() {
        let values = vec![0.93; 40];
        for confidence in [0.90, 0.95] {
            let ci = median_ci(&values, confidence).unwrap();
            assert_eq!(ci.low, 0.93);
            assert_eq!(ci.high, 0.93);
        }
    }

    #[test]
    fn test_invalid_values_are_discarded() {
        let ci = median_ci(&[f64::NAN, -1.0, 0.0, 2.0, f64::INFINITY], 0.95).unwrap();
        assert_eq!(ci, ConfidenceInterval { low: 2.0, high: 2.0 });
        assert_eq!(median_ci(&[0.0, -3.0], 0.95), None);
        assert_eq!(median_ci(&[], 0.95), None);
    }

    #[test]
    fn test_narrower_at_ninety_percent() {
        let values: Vec<f64> = (1..=400).map(|i| i as f64).collect();
        let ci95 = median_ci(&values, 0.95).unwrap();
        let ci90 = median_ci(&values, 0.90).unwrap();
        assert!(ci90.width() < ci95.width());
        assert!(ci95.contains(200.5));
    }
}
