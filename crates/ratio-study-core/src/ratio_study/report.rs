use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::central_tendency::{
    coefficient_of_dispersion, mean, median, price_related_differential, weighted_mean_ratio,
};
use super::median_ci::{is_supported_confidence, median_ci, z_for_confidence, DEFAULT_CONFIDENCE};
use super::prb::price_related_bias;
use super::preprocess::{filter_pairs, RawPair};
use super::vei::{vertical_equity_index, Stratum, VeiOutput, MIN_VEI_SAMPLE};
use crate::types::{finite, with_metadata, ComputationOutput, ConfidenceInterval};
use crate::RatioStudyResult;

pub const MSG_PRB_SKIPPED: &str = "PRB cannot be computed: need N ≥ 3 and variation in sale_price.";
pub const MSG_PRB_SINGULAR: &str =
    "PRB cannot be computed: log(sale_price) design matrix is singular.";
pub const MSG_NO_VALID_ROWS: &str = "No valid rows after exclusions.";
const NOTE_UNDEFINED_MEDIAN: &str = "Cannot compute VEI: sample median is undefined.";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// Options for a single ratio study.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioStudyOptions {
    /// 0.90 or 0.95; any other value is treated as 0.95.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl Default for RatioStudyOptions {
    fn default() -> Self {
        RatioStudyOptions {
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

/// Request body: the raw pairs plus options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioStudyInput {
    pub pairs: Vec<RawPair>,
    #[serde(flatten)]
    pub options: RatioStudyOptions,
}

/// Intermediate progress notification, `fraction` in `(0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub fraction: f64,
    pub message: String,
}

/// Full set of ratio-study metrics. Undefined statistics are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub messages: Vec<String>,
    pub n: usize,
    pub rows_read: usize,
    pub ignored: usize,
    pub excluded_non_positive: usize,
    pub median: Option<f64>,
    pub ci: Option<ConfidenceInterval>,
    #[serde(rename = "COD")]
    pub cod: Option<f64>,
    #[serde(rename = "PRD")]
    pub prd: Option<f64>,
    pub mean_ratio: Option<f64>,
    pub weighted_mean_ratio: Option<f64>,
    #[serde(rename = "PRB_slope")]
    pub prb_slope: Option<f64>,
    #[serde(rename = "PRB_p")]
    pub prb_p: Option<f64>,
    #[serde(rename = "VEI")]
    pub vei: Option<f64>,
    #[serde(rename = "VEI_significance")]
    pub vei_significance: Option<f64>,
    pub strata: Vec<Stratum>,
    pub vei_note: String,
    /// Present only when no row survived filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MetricsReport {
    fn empty(messages: Vec<String>, rows_read: usize, ignored: usize, excluded: usize) -> Self {
        MetricsReport {
            messages,
            n: 0,
            rows_read,
            ignored,
            excluded_non_positive: excluded,
            median: None,
            ci: None,
            cod: None,
            prd: None,
            mean_ratio: None,
            weighted_mean_ratio: None,
            prb_slope: None,
            prb_p: None,
            vei: None,
            vei_significance: None,
            strata: Vec::new(),
            vei_note: String::new(),
            error: Some(MSG_NO_VALID_ROWS.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a ratio study over raw `(sale, assessed)` pairs.
pub fn compute(pairs: &[RawPair], options: &RatioStudyOptions) -> RatioStudyResult<MetricsReport> {
    compute_with_progress(pairs, options, |_| {})
}

/// [`compute`] with a progress callback. Milestones arrive in increasing
/// order and the last one is always `1.0`.
pub fn compute_with_progress<F>(
    pairs: &[RawPair],
    options: &RatioStudyOptions,
    mut on_progress: F,
) -> RatioStudyResult<MetricsReport>
where
    F: FnMut(Progress),
{
    let mut step = |fraction: f64, message: &str| {
        on_progress(Progress {
            fraction,
            message: message.to_string(),
        })
    };

    step(0.05, "Parsing and filtering rows…");
    let filtered = filter_pairs(pairs);
    let dataset = &filtered.dataset;
    let n = dataset.len();

    let mut messages = vec![format!(
        "{} rows read. {} ignored for empty/non-numeric fields. {} excluded for sale_price ≤ 0.",
        filtered.rows_read, filtered.ignored, filtered.excluded_non_positive
    )];
    tracing::debug!(
        rows_read = filtered.rows_read,
        ignored = filtered.ignored,
        excluded_non_positive = filtered.excluded_non_positive,
        n,
        "filtered ratio-study rows"
    );

    if n == 0 {
        step(1.0, "Done");
        return Ok(MetricsReport::empty(
            messages,
            filtered.rows_read,
            filtered.ignored,
            filtered.excluded_non_positive,
        ));
    }

    let sale = dataset.sales();
    let assessed = dataset.assessed();
    let ratios = dataset.ratios();
    let confidence = options.confidence;

    step(0.25, "Computing central tendency…");
    let sample_median = median(&ratios);
    let cod = coefficient_of_dispersion(&ratios);
    let prd = price_related_differential(dataset);

    step(0.4, "Computing median confidence interval…");
    let ci = median_ci(&ratios, confidence);

    step(0.6, "Fitting price-related bias regression…");
    let has_price_variation = sale.iter().any(|&s| s != sale[0]);
    let (prb_slope, prb_p) = if n >= 3 && has_price_variation {
        match price_related_bias(&sale, &ratios)? {
            Some(est) => (finite(est.slope), est.p_value),
            None => {
                messages.push(MSG_PRB_SINGULAR.to_string());
                (None, None)
            }
        }
    } else {
        tracing::debug!(n, has_price_variation, "skipping PRB");
        messages.push(MSG_PRB_SKIPPED.to_string());
        (None, None)
    };

    step(0.8, "Stratifying for vertical equity…");
    let vei = match sample_median {
        Some(m) => vertical_equity_index(&sale, &assessed, &ratios, m, confidence)?,
        None => VeiOutput::undefined(Vec::new(), NOTE_UNDEFINED_MEDIAN),
    };

    step(1.0, "Done");
    Ok(MetricsReport {
        messages,
        n,
        rows_read: filtered.rows_read,
        ignored: filtered.ignored,
        excluded_non_positive: filtered.excluded_non_positive,
        median: sample_median,
        ci,
        cod,
        prd,
        mean_ratio: mean(&ratios),
        weighted_mean_ratio: weighted_mean_ratio(dataset),
        prb_slope,
        prb_p,
        vei: vei.vei,
        vei_significance: vei.vei_significance,
        strata: vei.strata,
        vei_note: vei.note,
        error: None,
    })
}

/// Run a ratio study and wrap the report in the standard output envelope.
pub fn run_ratio_study(
    input: &RatioStudyInput,
) -> RatioStudyResult<ComputationOutput<MetricsReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let confidence = input.options.confidence;
    if !is_supported_confidence(confidence) {
        warnings.push(format!(
            "Confidence level {confidence} is not supported; using 0.95 (z = 1.96)"
        ));
    }

    let report = compute(&input.pairs, &input.options)?;

    let dropped = report.ignored + report.excluded_non_positive;
    if dropped > 0 {
        warnings.push(format!(
            "{dropped} of {} rows excluded before analysis",
            report.rows_read
        ));
    }
    if let Some(err) = &report.error {
        warnings.push(err.clone());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Ratio study: median ratio with order-statistic CI, COD, PRD, PRB (OLS on ln(sale) with HC3 errors), VEI",
        &serde_json::json!({
            "confidence": confidence,
            "z": z_for_confidence(confidence),
            "min_vei_sample": MIN_VEI_SAMPLE,
            "vei_strata": "2 if N <= 50, 4 if N <= 500, else 10",
            "prb_min_sample": 3,
        }),
        warnings,
        elapsed,
        report,
    ))
}
