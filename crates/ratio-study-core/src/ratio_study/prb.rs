//! Price-related bias (PRB): OLS of the assessment ratio on ln(sale price)
//! with HC3 heteroskedasticity-consistent standard errors.
//!
//! The design has a single predictor, so `(X'X)^-1` is inverted in closed
//! form and the sandwich `(X'X)^-1 S (X'X)^-1` is expanded by hand.

use serde::{Deserialize, Serialize};

use crate::error::RatioStudyError;
use crate::types::finite;
use crate::RatioStudyResult;

/// Determinant below which `X'X` is treated as singular.
const SINGULAR_DETERMINANT: f64 = 1e-12;

/// Leverage is capped here so the HC3 weight stays finite.
const MAX_LEVERAGE: f64 = 0.999999;

/// Slope and two-sided significance of the PRB regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrbEstimate {
    pub slope: f64,
    /// `None` when the robust standard error is zero (e.g. a perfect fit) or
    /// the z statistic overflows.
    pub p_value: Option<f64>,
}

/// Standard normal CDF via the Zelen & Severo rational approximation
/// (Abramowitz & Stegun 26.2.17) with five-digit coefficients.
///
/// Report outputs depend on these exact coefficients; do not swap in an
/// exact CDF.
pub fn normal_cdf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let d = 0.3989423 * (-x * x / 2.0).exp();
    let tail = d
        * t
        * (0.3193815 + t * (-0.3565638 + t * (1.781478 + t * (-1.821256 + t * 1.330274))));
    if x > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Two-sided p-value for a z statistic.
pub fn two_sided_p_value(z: f64) -> f64 {
    2.0 * (1.0 - normal_cdf(z.abs()))
}

/// Fit `ratio = b0 + b1 * ln(sale)` and test `b1 = 0` with HC3 errors.
///
/// Callers gate on `n >= 3` and sale-price variation; violating either
/// contract is an error. A singular design returns `Ok(None)`.
pub fn price_related_bias(sale: &[f64], ratio: &[f64]) -> RatioStudyResult<Option<PrbEstimate>> {
    if sale.len() != ratio.len() {
        return Err(RatioStudyError::InvalidInput {
            field: "ratio".into(),
            reason: format!(
                "expected {} ratios to match sale prices, got {}",
                sale.len(),
                ratio.len()
            ),
        });
    }
    let n = ratio.len();
    if n < 3 {
        return Err(RatioStudyError::InsufficientData(
            "PRB requires at least 3 observations".into(),
        ));
    }

    let x: Vec<f64> = sale.iter().map(|s| s.ln()).collect();

    // Normal equations
    let (mut s1, mut sx, mut sxx, mut sy, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(ratio) {
        s1 += 1.0;
        sx += xi;
        sxx += xi * xi;
        sy += yi;
        sxy += xi * yi;
    }
    let det = s1 * sxx - sx * sx;
    if !det.is_finite() || det.abs() < SINGULAR_DETERMINANT {
        return Ok(None);
    }
    let inv00 = sxx / det;
    let inv01 = -sx / det;
    let inv11 = s1 / det;

    let beta0 = inv00 * sy + inv01 * sxy;
    let beta1 = inv01 * sy + inv11 * sxy;

    // Meat of the sandwich: sum of HC3-weighted outer products of [1, x_i].
    let (mut m00, mut m01, mut m11) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(ratio) {
        let residual = yi - (beta0 + beta1 * xi);
        let leverage = (inv00 + inv01 * xi) + (inv01 + inv11 * xi) * xi;
        let w = residual * residual / (1.0 - leverage.min(MAX_LEVERAGE)).powi(2);
        m00 += w;
        m01 += w * xi;
        m11 += w * xi * xi;
    }

    let v11 = inv01 * (m00 * inv01 + m01 * inv11) + inv11 * (m01 * inv01 + m11 * inv11);
    let se = v11.max(0.0).sqrt();


    Ok(Some(PrbEstimate {
        slope: beta1,
        p_value: slope_p_value(beta1, se),
    }))
}

/// Two-sided p-value of `slope / se`, or `None` when the z statistic is not
/// a finite number (zero or subnormal `se`, overflowing slope).
fn slope_p_value(slope: f64, se: f64) -> Option<f64> {
    if se <= 0.0 {
        return None;
    }
    let z = slope / se;
    if !z.is_finite() {
        return None;
    }
    finite(two_sided_p_value(z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-4);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-4);
        assert!((normal_cdf(1.0) + normal_cdf(-1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normal_cdf_matches_rational_approximation() {
        // Values of the five-coefficient approximation, not the exact CDF
        // (exact Phi(1) = 0.8413447460685429).
        assert!((normal_cdf(1.0) - 0.8413447721886403).abs() < 1e-15);
        assert!((normal_cdf(-0.5) - 0.30853745646452146).abs() < 1e-15);
        assert!((normal_cdf(1.96) - 0.9750021782662801).abs() < 1e-15);
    }

    #[test]
    fn test_hc3_reference_values() {
        let sale = [
            120_000.0, 95_000.0, 310_000.0, 180_000.0, 250_000.0, 75_000.0, 410_000.0, 150_000.0,
        ];
        let ratio = [0.98, 1.05, 0.91, 1.02, 0.88, 1.12, 0.95, 0.99];
        let est = price_related_bias(&sale, &ratio).unwrap().unwrap();
        // HC3 standard error for this fit is 0.04670652054049254.
        assert!((est.slope - -0.10755550897207655).abs() < 1e-12, "slope={}", est.slope);
        let p = est.p_value.unwrap();
        assert!((p - 0.02129036042683241).abs() < 1e-12, "p={p}");
    }

    #[test]
    fn test_overflowing_z_has_no_p_value() {
        // 1 / 1e-320 overflows to +inf.
        assert_eq!(slope_p_value(1.0, 1e-320), None);
        assert_eq!(slope_p_value(-1.0, 1e-320), None);
        assert_eq!(slope_p_value(f64::MAX, 0.5), None);
        assert_eq!(slope_p_value(0.3, 0.0), None);
        assert_eq!(slope_p_value(f64::NAN, 1.0), None);
        let p = slope_p_value(0.1, 0.05).unwrap();
        assert!((p - two_sided_p_value(2.0)).abs() < 1e-15);
    }

    #[test]
    fn test_p_value_at_conventional_threshold() {
        let p = two_sided_p_value(1.96);
        assert!((p - 0.05).abs() < 1e-3, "p={p}");
        assert_eq!(two_sided_p_value(2.5), two_sided_p_value(-2.5));
    }

    #[test]
    fn test_constant_ratio_has_zero_slope() {
        let sale: Vec<f64> = (1..=10).map(|i| i as f64 * 100_000.0).collect();
        let ratio = vec![0.85; 10];
        let est = price_related_bias(&sale, &ratio).unwrap().unwrap();
        assert!(est.slope.abs() < 1e-9, "slope={}", est.slope);
    }

    #[test]
    fn test_exact_log_linear_relationship() {
        let sale: Vec<f64> = (1..=20).map(|i| 50_000.0 * i as f64).collect();
        let ratio: Vec<f64> = sale.iter().map(|s| 0.2 + 0.05 * s.ln()).collect();
        let est = price_related_bias(&sale, &ratio).unwrap().unwrap();
        assert!((est.slope - 0.05).abs() < 1e-9, "slope={}", est.slope);
    }

    #[test]
    fn test_noisy_regressive_slope_is_significant() {
        let sale: Vec<f64> = (1..=60).map(|i| 20_000.0 * i as f64).collect();
        let ratio: Vec<f64> = sale
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let wiggle = if i % 2 == 0 { 0.01 } else { -0.01 };
                0.3 + 0.04 * s.ln() + wiggle
            })
            .collect();
        let est = price_related_bias(&sale, &ratio).unwrap().unwrap();
        assert!(est.slope > 0.0);
        assert!(est.p_value.unwrap() < 0.01, "p={:?}", est.p_value);
    }

    #[test]
    fn test_no_price_variation_is_singular() {
        // ln(1) = 0 keeps X'X exactly singular.
        let sale = vec![1.0; 5];
        let ratio = vec![0.9, 1.0, 1.1, 0.95, 1.05];
        assert_eq!(price_related_bias(&sale, &ratio).unwrap(), None);
    }

    #[test]
    fn test_contract_violations_are_errors() {
        assert!(price_related_bias(&[1.0, 2.0], &[1.0, 1.0]).is_err());
        assert!(price_related_bias(&[1.0, 2.0, 3.0], &[1.0, 1.0]).is_err());
    }
}
