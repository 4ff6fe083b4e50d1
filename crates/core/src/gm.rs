//! Per-rupture ground-motion data consumed by the hazard engine.
//!
//! The GMM itself is external; this module only holds its outputs: a
//! log-normal `(median, sigma)` pair per rupture, or an empirical
//! distribution of simulated IM values. Values are stored in a vector
//! aligned with the indices of the branch's [`RuptureTable`].

use std::f64::consts::SQRT_2;
use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use crate::error::HazardError;
use crate::rupture::RuptureTable;

// ---------------------------------------------------------------------------
// Data type
// ---------------------------------------------------------------------------

/// Kind of ground-motion data behind a branch or ensemble.
///
/// `Mixed` is never inferred as acceptable: callers must opt into it
/// explicitly when building curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImDataType {
    Parametric,
    NonParametric,
    Mixed,
}

impl ImDataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parametric => "parametric",
            Self::NonParametric => "non_parametric",
            Self::Mixed => "mixed",
        }
    }

    /// Combine two data types; differing kinds give `Mixed`.
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Mixed
        }
    }
}

impl fmt::Display for ImDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Distributions
// ---------------------------------------------------------------------------

/// `P(IM > x)` for a log-normal IM with the given median and log-sigma.
///
/// A zero sigma is a deterministic IM equal to the median.
pub fn lognormal_survival(x: f64, median: f64, sigma: f64) -> f64 {
    if sigma == 0.0 {
        return if x < median { 1.0 } else { 0.0 };
    }
    let z = (x.ln() - median.ln()) / sigma;
    0.5 * erfc(z / SQRT_2)
}

/// Empirical IM distribution from simulated realisations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EmpiricalRecord", into = "EmpiricalRecord")]
pub struct EmpiricalSurvival {
    /// Sorted ascending.
    samples: Vec<f64>,
}

impl EmpiricalSurvival {
    pub fn from_samples(mut samples: Vec<f64>) -> Result<Self, HazardError> {
        if samples.is_empty() {
            return Err(HazardError::Validation(
                "Empirical distribution needs at least one sample".into(),
            ));
        }
        if let Some(bad) = samples.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(HazardError::DataIntegrity(format!(
                "Empirical IM sample {bad} is not a finite non-negative value"
            )));
        }
        samples.sort_by(f64::total_cmp);
        Ok(Self { samples })
    }

    /// Fraction of samples strictly above `x`.
    pub fn survival(&self, x: f64) -> f64 {
        let at_or_below = self.samples.partition_point(|&s| s <= x);
        (self.samples.len() - at_or_below) as f64 / self.samples.len() as f64
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmpiricalRecord {
    samples: Vec<f64>,
}

impl TryFrom<EmpiricalRecord> for EmpiricalSurvival {
    type Error = HazardError;

    fn try_from(record: EmpiricalRecord) -> Result<Self, Self::Error> {
        Self::from_samples(record.samples)
    }
}

impl From<EmpiricalSurvival> for EmpiricalRecord {
    fn from(dist: EmpiricalSurvival) -> Self {
        Self {
            samples: dist.samples,
        }
    }
}

// ---------------------------------------------------------------------------
// RuptureGm
// ---------------------------------------------------------------------------

/// Ground-motion output for one rupture at one site and IM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuptureGm {
    /// Log-normal: `median` in IM units, `sigma` in natural-log units.
    Parametric { median: f64, sigma: f64 },
    NonParametric(EmpiricalSurvival),
}

impl RuptureGm {
    pub fn parametric(median: f64, sigma: f64) -> Result<Self, HazardError> {
        let gm = Self::Parametric { median, sigma };
        gm.validate()?;
        Ok(gm)
    }

    pub fn data_type(&self) -> ImDataType {
        match self {
            Self::Parametric { .. } => ImDataType::Parametric,
            Self::NonParametric(_) => ImDataType::NonParametric,
        }
    }

    /// `P(IM > x)` for this rupture.
    pub fn survival(&self, x: f64) -> f64 {
        match self {
            Self::Parametric { median, sigma } => lognormal_survival(x, *median, *sigma),
            Self::NonParametric(dist) => dist.survival(x),
        }
    }

    /// Number of log-standard deviations `target` lies above the median.
    ///
    /// Only defined for parametric data with a non-zero sigma.
    pub fn epsilon(&self, target: f64) -> Option<f64> {
        match self {
            Self::Parametric { median, sigma } if *sigma > 0.0 => {
                Some((target.ln() - median.ln()) / sigma)
            }
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), HazardError> {
        match self {
            Self::Parametric { median, sigma } => {
                if !(median.is_finite() && *median > 0.0) {
                    return Err(HazardError::DataIntegrity(format!(
                        "Median {median} must be finite and positive"
                    )));
                }
                if !(sigma.is_finite() && *sigma >= 0.0) {
                    return Err(HazardError::DataIntegrity(format!(
                        "Sigma {sigma} must be finite and non-negative"
                    )));
                }
                Ok(())
            }
            Self::NonParametric(_) => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// GmTable
// ---------------------------------------------------------------------------

/// Ground-motion values of one branch, aligned with its rupture table.
#[derive(Debug, Clone, PartialEq)]
pub struct GmTable {
    values: Vec<RuptureGm>,
}

impl GmTable {
    /// Check shape against `ruptures` and validate every entry.
    pub fn new(ruptures: &RuptureTable, values: Vec<RuptureGm>) -> Result<Self, HazardError> {
        if values.len() != ruptures.len() {
            return Err(HazardError::Validation(format!(
                "Ground-motion table has {} entries but the rupture table has {}",
                values.len(),
                ruptures.len()
            )));
        }
        for (rup, gm) in ruptures.iter().zip(&values) {
            gm.validate().map_err(|e| {
                HazardError::DataIntegrity(format!("Rupture {}: {e}", rup.id))
            })?;
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&RuptureGm> {
        self.values.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuptureGm> {
        self.values.iter()
    }

    /// `Parametric` or `NonParametric` when homogeneous, else `Mixed`.
    pub fn data_type(&self) -> ImDataType {
        self.values
            .iter()
            .map(RuptureGm::data_type)
            .reduce(ImDataType::merge)
            .unwrap_or(ImDataType::Parametric)
    }
}
