//! Deterministic synthetic sales for exercising the ratio study.
//!
//! Two assessment models are provided: proportional noise around the sale
//! price (a well-behaved roll) and assessed value equal to the squared sale
//! price (a strongly progressive roll that PRB and VEI must flag).

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::RatioStudyError;
use crate::ratio_study::preprocess::{RawField, RawPair};
use crate::RatioStudyResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDistribution {
    Uniform,
    /// More low-priced sales than high-priced ones.
    #[default]
    LogUniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssessmentModel {
    /// `assessed = price * (1 ± e)` with `e` uniform in `[0, max_error)`.
    ProportionalNoise { max_error: f64 },
    /// `assessed = price²`.
    SquaredPrice,
}

impl Default for AssessmentModel {
    fn default() -> Self {
        AssessmentModel::ProportionalNoise { max_error: 0.15 }
    }
}

/// Seed given either as a number or as a free-form label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedSpec {
    Number(u64),
    Label(String),
}

impl SeedSpec {
    /// All-digit labels are read as numbers; other labels are hashed with
    /// 32-bit FNV-1a.
    pub fn to_u64(&self) -> u64 {
        match self {
            SeedSpec::Number(n) => *n,
            SeedSpec::Label(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse().unwrap_or_else(|_| u64::from(fnv1a_32(s)))
            }
            SeedSpec::Label(s) => u64::from(fnv1a_32(s)),
        }
    }
}

fn fnv1a_32(s: &str) -> u32 {
    s.encode_utf16().fold(2_166_136_261_u32, |h, unit| {
        (h ^ u32::from(unit)).wrapping_mul(16_777_619)
    })
}

fn default_rows() -> usize {
    1000
}

fn default_min_price() -> f64 {
    10_000.0
}

fn default_max_price() -> f64 {
    3_000_000.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticDataInput {
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_min_price")]
    pub min_price: f64,
    #[serde(default = "default_max_price")]
    pub max_price: f64,
    #[serde(default)]
    pub distribution: PriceDistribution,
    #[serde(default)]
    pub model: AssessmentModel,
    /// Entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<SeedSpec>,
}

impl Default for SyntheticDataInput {
    fn default() -> Self {
        SyntheticDataInput {
            rows: default_rows(),
            min_price: default_min_price(),
            max_price: default_max_price(),
            distribution: PriceDistribution::default(),
            model: AssessmentModel::default(),
            seed: None,
        }
    }
}

/// One generated row, whole dollars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSale {
    pub sale_price: f64,
    pub assessed_value: f64,
}

impl SyntheticSale {
    pub fn to_raw_pair(&self) -> RawPair {
        (
            RawField::Number(self.sale_price),
            RawField::Number(self.assessed_value),
        )
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

fn validate(input: &SyntheticDataInput) -> RatioStudyResult<()> {
    if input.rows == 0 {
        return Err(RatioStudyError::InvalidInput {
            field: "rows".into(),
            reason: "Must be at least 1".into(),
        });
    }
    if !input.min_price.is_finite() || input.min_price < 0.0 {
        return Err(RatioStudyError::InvalidInput {
            field: "min_price".into(),
            reason: "Must be a non-negative number".into(),
        });
    }
    if input.distribution == PriceDistribution::LogUniform && input.min_price <= 0.0 {
        return Err(RatioStudyError::InvalidInput {
            field: "min_price".into(),
            reason: "Log-uniform prices need a positive minimum".into(),
        });
    }
    if !input.max_price.is_finite() || input.max_price < input.min_price {
        return Err(RatioStudyError::InvalidInput {
            field: "max_price".into(),
            reason: "Must be at least min_price".into(),
        });
    }
    if let AssessmentModel::ProportionalNoise { max_error } = input.model {
        if !max_error.is_finite() || max_error < 0.0 {
            return Err(RatioStudyError::InvalidInput {
                field: "model.max_error".into(),
                reason: "Must be a non-negative fraction".into(),
            });
        }
    }
    Ok(())
}

fn sample_price(rng: &mut StdRng, input: &SyntheticDataInput) -> f64 {
    let u: f64 = rng.gen();
    let price = match input.distribution {
        PriceDistribution::Uniform => input.min_price + (input.max_price - input.min_price) * u,
        PriceDistribution::LogUniform => {
            let (ln_min, ln_max) = (input.min_price.ln(), input.max_price.ln());
            (ln_min + (ln_max - ln_min) * u).exp()
        }
    };
    price.round().max(1.0)
}

fn assess(rng: &mut StdRng, model: AssessmentModel, price: f64) -> f64 {
    match model {
        AssessmentModel::ProportionalNoise { max_error } => {
            let magnitude = max_error * rng.gen::<f64>();
            let sign = if rng.gen::<f64>() < 0.5 { -1.0 } else { 1.0 };
            (price * (1.0 + sign * magnitude)).round().max(0.0)
        }
        AssessmentModel::SquaredPrice => (price * price).round(),
    }
}

/// Generate `input.rows` synthetic sales. The same seed always yields the
/// same rows.
pub fn generate_sales(input: &SyntheticDataInput) -> RatioStudyResult<Vec<SyntheticSale>> {
    validate(input)?;

    let mut rng = match &input.seed {
        Some(seed) => StdRng::seed_from_u64(seed.to_u64()),
        None => StdRng::from_entropy(),
    };

    let sales = (0..input.rows)
        .map(|_| {
            let sale_price = sample_price(&mut rng, input);
            let assessed_value = assess(&mut rng, input.model, sale_price);
            SyntheticSale {
                sale_price,
                assessed_value,
            }
        })
        .collect();
    Ok(sales)
}

/// [`generate_sales`] shaped as raw pairs ready for the ratio study.
pub fn generate_pairs(input: &SyntheticDataInput) -> RatioStudyResult<Vec<RawPair>> {
    Ok(generate_sales(input)?
        .iter()
        .map(SyntheticSale::to_raw_pair)
        .collect())
}
