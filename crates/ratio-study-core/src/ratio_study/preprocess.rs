use serde::{Deserialize, Serialize};

use crate::types::Ratio;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One raw field as supplied by the caller: a number, free text such as
/// `"1,250,000"`, nothing at all, or any other JSON value (booleans,
/// objects, arrays), which counts as non-numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Number(f64),
    Text(String),
    Missing,
    Other(serde_json::Value),
}

impl From<f64> for RawField {
    fn from(v: f64) -> Self {
        RawField::Number(v)
    }
}

impl From<i64> for RawField {
    fn from(v: i64) -> Self {
        RawField::Number(v as f64)
    }
}

impl From<&str> for RawField {
    fn from(v: &str) -> Self {
        RawField::Text(v.to_string())
    }
}

impl From<String> for RawField {
    fn from(v: String) -> Self {
        RawField::Text(v)
    }
}

impl RawField {
    /// Coerce to a finite number. `None` means not-a-number.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            RawField::Number(v) => v.is_finite().then_some(*v),
            RawField::Text(s) => parse_number(s),
            RawField::Missing | RawField::Other(_) => None,
        }
    }
}

/// `(sale price, assessed value)` exactly as received.
pub type RawPair = (RawField, RawField);

/// A validated sale with `sale > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub sale: f64,
    pub assessed: f64,
}

impl Observation {
    pub fn ratio(&self) -> Ratio {
        self.assessed / self.sale
    }
}

/// The clean observations surviving row filtering, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    observations: Vec<Observation>,
}

impl Dataset {
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn sales(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.sale).collect()
    }

    pub fn assessed(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.assessed).collect()
    }

    pub fn ratios(&self) -> Vec<Ratio> {
        self.observations.iter().map(Observation::ratio).collect()
    }
}

/// Dataset plus the tallies of rows that did not make it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub dataset: Dataset,
    pub rows_read: usize,
    /// Rows with an empty or non-numeric field.
    pub ignored: usize,
    /// Rows whose sale price was zero or negative.
    pub excluded_non_positive: usize,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a decimal string, tolerating surrounding whitespace and thousands
/// separators. Empty, non-numeric and non-finite text yields `None`.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Validate raw pairs into a [`Dataset`]. Malformed rows are tallied, never
/// fatal.
pub fn filter_pairs(pairs: &[RawPair]) -> FilterOutcome {
    let mut observations = Vec::with_capacity(pairs.len());
    let mut ignored = 0;
    let mut excluded_non_positive = 0;

    for (raw_sale, raw_assessed) in pairs {
        let (sale, assessed) = match (raw_sale.to_number(), raw_assessed.to_number()) {
            (Some(s), Some(a)) => (s, a),
            _ => {
                ignored += 1;
                continue;
            }
        };
        if sale <= 0.0 {
            excluded_non_positive += 1;
            continue;
        }
        observations.push(Observation { sale, assessed });
    }

    FilterOutcome {
        dataset: Dataset { observations },
        rows_read: pairs.len(),
        ignored,
        excluded_non_positive,
    }
}

impl FromIterator<Observation> for Dataset {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        Dataset {
            observations: iter.into_iter().collect(),
        }
    }
}
