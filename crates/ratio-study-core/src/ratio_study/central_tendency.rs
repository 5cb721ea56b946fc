//! Central tendency and the two classic ratio-study indicators built on it:
//! the coefficient of dispersion (COD) and the price-related differential
//! (PRD).

use super::preprocess::Dataset;
use crate::types::finite;

/// Sort a copy of `values` ascending.
pub(crate) fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Median; the mean of the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted_copy(values);
    let n = sorted.len();
    let mid = n / 2;
    let m = if n % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    };
    finite(m)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    finite(values.iter().sum::<f64>() / values.len() as f64)
}

/// Aggregate assessed value over aggregate sale price.
pub fn weighted_mean_ratio(dataset: &Dataset) -> Option<f64> {
    if dataset.is_empty() {
        return None;
    }
    let total_assessed: f64 = dataset.observations().iter().map(|o| o.assessed).sum();
    let total_sale: f64 = dataset.observations().iter().map(|o| o.sale).sum();
    finite(total_assessed / total_sale)
}

/// Coefficient of dispersion, in percent of the median ratio.
///
/// Uses the median absolute deviation from the median rather than the mean
/// absolute deviation.
pub fn coefficient_of_dispersion(ratios: &[f64]) -> Option<f64> {
    let med = median(ratios)?;
    let deviations: Vec<f64> = ratios.iter().map(|r| (r - med).abs()).collect();
    let mad = median(&deviations)?;
    finite(100.0 * mad / med)
}

/// Price-related differential: mean ratio over the sale-weighted mean ratio.
pub fn price_related_differential(dataset: &Dataset) -> Option<f64> {
    let mean_ratio = mean(&dataset.ratios())?;
    let weighted = weighted_mean_ratio(dataset)?;
    finite(mean_ratio / weighted)
}
