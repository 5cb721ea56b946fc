//! Vertical equity index (VEI).
//!
//! Sales are ranked low-to-high by a value proxy, cut into equal-count
//! strata that never split a run of tied proxies, and the median ratio of
//! the top stratum is compared against the bottom one.

use serde::{Deserialize, Serialize};

use super::central_tendency::median;
use super::median_ci::median_ci;
use crate::error::RatioStudyError;
use crate::types::finite;
use crate::RatioStudyResult;

/// VEI is not reported below this many observations.
pub const MIN_VEI_SAMPLE: usize = 10;

pub const NOTE_INSUFFICIENT_SAMPLE: &str = "Cannot compute VEI: N < 10";
pub const NOTE_INSUFFICIENT_STRATA: &str = "Insufficient strata after tie handling.";

/// Aggregate statistics for one value-ordered group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stratum {
    #[serde(rename = "n")]
    pub count: usize,
    pub median: Option<f64>,
    /// Undefined for single-member strata.
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VeiOutput {
    /// Percent difference in median ratio, top stratum minus bottom.
    pub vei: Option<f64>,
    /// Widest-gap band: top stratum CI high minus bottom stratum CI low,
    /// in percent of the sample median.
    pub vei_significance: Option<f64>,
    pub strata: Vec<Stratum>,
    /// Empty when VEI was computed.
    pub note: String,
}

impl VeiOutput {
    pub(crate) fn undefined(strata: Vec<Stratum>, note: &str) -> Self {
        VeiOutput {
            vei: None,
            vei_significance: None,
            strata,
            note: note.to_string(),
        }
    }
}

/// Number of strata for a sample of `n`.
pub fn group_count(n: usize) -> usize {
    if n <= 50 {
        2
    } else if n <= 500 {
        4
    } else {
        10
    }
}

/// Ranking proxy: half absolute sale price, half assessed value normalised
/// by the sample median. Only used for ordering.
pub fn ranking_proxy(sale: &[f64], assessed: &[f64], sample_median: f64) -> Vec<f64> {
    sale.iter()
        .zip(assessed)
        .map(|(s, a)| 0.5 * s + 0.5 * (a / sample_median))
        .collect()
}

/// Split observation indices into at most `groups` strata ordered by
/// `proxy`.
///
/// Indices are stably sorted by proxy (ties keep input order). The first
/// `n % groups` strata take one extra member, and every boundary is pushed
/// forward past any run of equal proxies, so fewer than `groups` strata may
/// come back. Every index appears in exactly one stratum.
pub fn partition_by_proxy(proxy: &[f64], groups: usize) -> Vec<Vec<usize>> {
    let n = proxy.len();
    if n == 0 || groups == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| proxy[a].total_cmp(&proxy[b]));

    let base = n / groups;
    let mut remainder = n % groups;
    let mut partitions = Vec::with_capacity(groups);
    let mut start = 0;

    for _ in 0..groups {
        if start >= n {
            break;
        }
        let mut size = base;
        if remainder > 0 {
            size += 1;
            remainder -= 1;
        }
        let mut end = (start + size).min(n);
        while end < n && proxy[order[end - 1]] == proxy[order[end]] {
            end += 1;
        }
        if end > start {
            partitions.push(order[start..end].to_vec());
        }
        start = end;
    }

    partitions
}

fn summarize(ratios: &[f64], confidence: f64) -> Stratum {
    let ci = if ratios.len() >= 2 {
        median_ci(ratios, confidence)
    } else {
        None
    };
    Stratum {
        count: ratios.len(),
        median: median(ratios),
        ci_low: ci.map(|c| c.low),
        ci_high: ci.map(|c| c.high),
    }
}

/// Compute VEI and its significance band.
///
/// Small samples and tie-collapsed stratifications are reported through
/// `note` with undefined statistics, not as errors.
pub fn vertical_equity_index(
    sale: &[f64],
    assessed: &[f64],
    ratio: &[f64],
    sample_median: f64,
    confidence: f64,
) -> RatioStudyResult<VeiOutput> {
    let n = ratio.len();
    if sale.len() != n || assessed.len() != n {
        return Err(RatioStudyError::InvalidInput {
            field: "sale/assessed/ratio".into(),
            reason: format!(
                "column lengths differ: {} sales, {} assessed, {} ratios",
                sale.len(),
                assessed.len(),
                n
            ),
        });
    }
    if n < MIN_VEI_SAMPLE {
        return Ok(VeiOutput::undefined(Vec::new(), NOTE_INSUFFICIENT_SAMPLE));
    }

    let proxy = ranking_proxy(sale, assessed, sample_median);
    let partitions = partition_by_proxy(&proxy, group_count(n));
    tracing::debug!(
        requested = group_count(n),
        formed = partitions.len(),
        "stratified sample for VEI"
    );

    let strata: Vec<Stratum> = partitions
        .iter()
        .map(|members| {
            let group_ratios: Vec<f64> = members.iter().map(|&i| ratio[i]).collect();
            summarize(&group_ratios, confidence)
        })
        .collect();

    let (first, last) = match (strata.first(), strata.last()) {
        (Some(first), Some(last)) if strata.len() >= 2 => (first.clone(), last.clone()),
        _ => return Ok(VeiOutput::undefined(strata, NOTE_INSUFFICIENT_STRATA)),
    };

    let percent_of_median = |diff: f64| finite(100.0 * diff / sample_median);
    let vei = last
        .median
        .zip(first.median)
        .and_then(|(hi, lo)| percent_of_median(hi - lo));
    let vei_significance = last
        .ci_high
        .zip(first.ci_low)
        .and_then(|(hi, lo)| percent_of_median(hi - lo));

    Ok(VeiOutput {
        vei,
        vei_significance,
        strata,
        note: String::new(),
    })
}
