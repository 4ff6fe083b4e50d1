//! Ensemble aggregation of branch hazard curves.
//!
//! Combines weighted branch curves on a common IM-level grid into the
//! ensemble mean (total, fault and distributed) and, optionally, weighted
//! percentile curves. The mean curve is the inversion target for
//! disaggregation and UHS.

use serde::{Deserialize, Serialize};

use crate::error::HazardError;
use crate::exceedance::{build_branch_curve, Branch, BranchHazardResult};
use crate::gm::ImDataType;
use crate::im::Im;
use crate::interpolate::{rp_to_exceedance, validate_im_levels, validate_rates, HazardCurve};
use crate::site::SiteInfo;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Allowed deviation of the weight sum from 1.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Percentiles (in percent) computed when none are requested.
pub const DEFAULT_PERCENTILES: [f64; 3] = [16.0, 50.0, 84.0];

/// Relative tolerance when comparing branch grids.
const GRID_RTOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOptions {
    pub calc_percentiles: bool,
    /// Percentiles in percent, each in `(0, 100)`.
    pub percentiles: Vec<f64>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            calc_percentiles: true,
            percentiles: DEFAULT_PERCENTILES.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Weighted percentile curve across branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileCurve {
    pub label: String,
    pub percentile: f64,
    pub rates: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleHazardResult {
    pub im: Im,
    pub site: SiteInfo,
    pub im_levels: Vec<f64>,
    pub mean: Vec<f64>,
    pub fault_mean: Vec<f64>,
    pub ds_mean: Vec<f64>,
    pub percentiles: Option<Vec<PercentileCurve>>,
}

impl EnsembleHazardResult {
    pub fn mean_curve(&self) -> Result<HazardCurve, HazardError> {
        HazardCurve::new(self.im_levels.clone(), self.mean.clone())
    }

    /// Mean exceedance rate at `level`.
    pub fn im_to_exceedance(&self, level: f64) -> Result<f64, HazardError> {
        self.mean_curve()?.im_to_exceedance(level)
    }

    /// IM level at which the mean curve reaches `exceedance`.
    pub fn exceedance_to_im(&self, exceedance: f64) -> Result<f64, HazardError> {
        self.mean_curve()?.exceedance_to_im(exceedance)
    }

    pub fn rp_to_im(&self, rp: f64) -> Result<f64, HazardError> {
        self.exceedance_to_im(rp_to_exceedance(rp))
    }

    pub fn percentile(&self, label: &str) -> Option<&PercentileCurve> {
        self.percentiles
            .as_ref()
            .and_then(|curves| curves.iter().find(|c| c.label == label))
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Each weight in `(0, 1]` and the sum within [`WEIGHT_TOLERANCE`] of 1.
pub fn validate_weights(weights: &[f64]) -> Result<(), HazardError> {
    let sum: f64 = weights.iter().sum();
    let each_valid = weights.iter().all(|w| *w > 0.0 && *w <= 1.0);
    if !each_valid || !((sum - 1.0).abs() <= WEIGHT_TOLERANCE) {
        return Err(HazardError::InvalidWeights {
            sum,
            tolerance: WEIGHT_TOLERANCE,
        });
    }
    Ok(())
}

fn check_grid(branch: &BranchHazardResult, grid: &[f64]) -> Result<(), HazardError> {
    let mismatch = |detail: String| HazardError::GridMismatch {
        branch_id: branch.branch_id.clone(),
        detail,
    };
    if branch.im_levels.len() != grid.len() {
        return Err(mismatch(format!(
            "{} levels, expected {}",
            branch.im_levels.len(),
            grid.len()
        )));
    }
    if let Some((i, (a, b))) = branch
        .im_levels
        .iter()
        .zip(grid)
        .enumerate()
        .find(|(_, (a, b))| (*a - *b).abs() > GRID_RTOL * b.abs())
    {
        return Err(mismatch(format!("level {i} is {a}, expected {b}")));
    }
    for series in [&branch.rates, &branch.fault_rates, &branch.ds_rates] {
        if series.len() != grid.len() {
            return Err(mismatch(format!(
                "{} rates for {} levels",
                series.len(),
                grid.len()
            )));
        }
        validate_rates(series).map_err(|e| match e {
            HazardError::DataIntegrity(msg) => {
                HazardError::DataIntegrity(format!("Branch {}: {msg}", branch.branch_id))
            }
            other => other,
        })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Percentiles
// ---------------------------------------------------------------------------

/// Weighted percentile of `values`, treating `weights` as a discrete PMF.
///
/// `p` is a fraction in `[0, 1]`. Values are sorted, weights accumulated,
/// and `p` located between the two bracketing cumulative weights with
/// linear interpolation of the values. `p` at or below the first
/// cumulative weight gives the smallest value, at or above the last the
/// largest. An empty input gives NaN.
pub fn weighted_percentile(values: &[f64], weights: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut pairs: Vec<(f64, f64)> = values.iter().copied().zip(weights.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut cumulative = Vec::with_capacity(pairs.len());
    let mut acc = 0.0;
    for (_, w) in &pairs {
        acc += w;
        cumulative.push(acc);
    }

    let last = pairs.len() - 1;
    if p <= cumulative[0] {
        return pairs[0].0;
    }
    if p >= cumulative[last] {
        return pairs[last].0;
    }

    let j = cumulative.partition_point(|&c| c < p);
    let i = j - 1;
    let t = (p - cumulative[i]) / (cumulative[j] - cumulative[i]);
    pairs[i].0 + t * (pairs[j].0 - pairs[i].0)
}

/// Ordinal label of a percentile, e.g. `16th`, `2.5th`, `1st`.
pub fn percentile_label(percentile: f64) -> String {
    if percentile.fract() != 0.0 {
        return format!("{percentile}th");
    }
    let n = percentile as u64;
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Aggregate branch curves into ensemble statistics.
///
/// All branches must share one IM-level grid (see
/// [`BranchHazardResult::resample`]) and their weights must form a PMF.
pub fn aggregate(
    im: Im,
    site: SiteInfo,
    branches: &[BranchHazardResult],
    options: &AggregateOptions,
) -> Result<EnsembleHazardResult, HazardError> {
    let Some(first) = branches.first() else {
        return Err(HazardError::Validation(
            "Cannot aggregate an empty ensemble".into(),
        ));
    };
    let weights: Vec<f64> = branches.iter().map(|b| b.weight).collect();
    validate_weights(&weights)?;

    let grid = first.im_levels.clone();
    validate_im_levels(&grid)?;
    for branch in branches {
        check_grid(branch, &grid)?;
    }

    let n = grid.len();
    let (mut mean, mut fault_mean, mut ds_mean) = (vec![0.0; n], vec![0.0; n], vec![0.0; n]);
    for branch in branches {
        for i in 0..n {
            mean[i] += branch.weight * branch.rates[i];
            fault_mean[i] += branch.weight * branch.fault_rates[i];
            ds_mean[i] += branch.weight * branch.ds_rates[i];
        }
    }

    let percentiles = if options.calc_percentiles {
        Some(percentile_curves(branches, &weights, n, &options.percentiles)?)
    } else {
        None
    };

    Ok(EnsembleHazardResult {
        im,
        site,
        im_levels: grid,
        mean,
        fault_mean,
        ds_mean,
        percentiles,
    })
}

fn percentile_curves(
    branches: &[BranchHazardResult],
    weights: &[f64],
    n_levels: usize,
    percentiles: &[f64],
) -> Result<Vec<PercentileCurve>, HazardError> {
    percentiles
        .iter()
        .map(|&pct| {
            if !(pct > 0.0 && pct < 100.0) {
                return Err(HazardError::Validation(format!(
                    "Percentile {pct} must be within (0, 100)"
                )));
            }
            let rates = (0..n_levels)
                .map(|i| {
                    let values: Vec<f64> = branches.iter().map(|b| b.rates[i]).collect();
                    weighted_percentile(&values, weights, pct / 100.0)
                })
                .collect();
            Ok(PercentileCurve {
                label: percentile_label(pct),
                percentile: pct,
                rates,
            })
        })
        .collect()
}

/// Build every branch curve on `im_levels` and aggregate them.
pub fn run_ensemble_hazard(
    im: Im,
    site: SiteInfo,
    branches: &[Branch],
    im_levels: &[f64],
    expected: ImDataType,
    options: &AggregateOptions,
) -> Result<EnsembleHazardResult, HazardError> {
    let weights: Vec<f64> = branches.iter().map(|b| b.weight).collect();
    validate_weights(&weights)?;

    let curves = branches
        .iter()
        .map(|b| build_branch_curve(b, im_levels, expected))
        .collect::<Result<Vec<_>, _>>()?;
    aggregate(im, site, &curves, options)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
