//! Binning of disaggregation shares into magnitude × distance grids.
//!
//! Gridding is a pure function of a [`DisaggResult`]: each rupture's full
//! share lands in exactly one bin of every grid, so every grid sums to the
//! total share.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::disagg::DisaggResult;
use crate::error::HazardError;
use crate::im::Im;
use crate::rupture::{SourceType, TectonicType};
use crate::site::SiteInfo;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_MAG_BIN_WIDTH: f64 = 0.5;

/// Distance bin width when every contributing distance is within
/// [`NEAR_FIELD_MAX_DISTANCE`].
pub const NEAR_DIST_BIN_WIDTH: f64 = 10.0;
pub const FAR_DIST_BIN_WIDTH: f64 = 20.0;
pub const NEAR_FIELD_MAX_DISTANCE: f64 = 200.0;

/// Upper bound on the bins along the magnitude or distance axis.
pub const MAX_BINS_PER_AXIS: usize = 1000;

/// Interior epsilon bin edges; the outer bins are open ended.
pub const DEFAULT_EPSILON_EDGES: [f64; 7] = [-2.0, -1.0, -0.5, 0.0, 0.5, 1.0, 2.0];

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub mag_bin_width: f64,
    /// `None` picks the width from the largest contributing distance.
    pub dist_bin_width: Option<f64>,
    pub epsilon_edges: Vec<f64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            mag_bin_width: DEFAULT_MAG_BIN_WIDTH,
            dist_bin_width: None,
            epsilon_edges: DEFAULT_EPSILON_EDGES.to_vec(),
        }
    }
}

impl GridConfig {
    fn validate(&self) -> Result<(), HazardError> {
        for (name, width) in [
            ("magnitude", Some(self.mag_bin_width)),
            ("distance", self.dist_bin_width),
        ] {
            if let Some(w) = width {
                if !(w.is_finite() && w > 0.0) {
                    return Err(HazardError::Validation(format!(
                        "The {name} bin width must be positive, got {w}"
                    )));
                }
            }
        }
        if self.epsilon_edges.windows(2).any(|w| w[1] <= w[0])
            || self.epsilon_edges.iter().any(|e| !e.is_finite())
        {
            return Err(HazardError::Validation(
                "Epsilon bin edges must be finite and strictly increasing".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Grids are indexed `[magnitude bin, distance bin]`; the 3-D grids carry
/// the category (tectonic type, source type or epsilon bin) on axis 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisaggGridResult {
    pub im: Im,
    pub site: SiteInfo,
    pub exceedance: Option<f64>,
    pub im_level: f64,
    pub mag_edges: Vec<f64>,
    pub dist_edges: Vec<f64>,
    /// Interior edges; `len + 1` bins.
    pub epsilon_edges: Vec<f64>,
    pub mag_dist: Array2<f64>,
    /// Axis 0 follows [`TectonicType::ALL`].
    pub tectonic: Array3<f64>,
    /// Axis 0 follows [`SourceType::ALL`].
    pub source: Array3<f64>,
    /// Omitted when any contributing rupture has no epsilon.
    pub epsilon: Option<Array3<f64>>,
    pub tectonic_totals: Vec<f64>,
    pub source_totals: Vec<f64>,
}

impl DisaggGridResult {
    pub fn tectonic_total(&self, tectonic_type: TectonicType) -> f64 {
        self.tectonic_totals[tectonic_type.index()]
    }

    pub fn source_total(&self, source_type: SourceType) -> f64 {
        self.source_totals[source_type.index()]
    }

    /// Centres of the magnitude bins.
    pub fn mag_centres(&self) -> Vec<f64> {
        centres(&self.mag_edges)
    }

    pub fn dist_centres(&self) -> Vec<f64> {
        centres(&self.dist_edges)
    }
}

fn centres(edges: &[f64]) -> Vec<f64> {
    edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
}

// ---------------------------------------------------------------------------
// Binning
// ---------------------------------------------------------------------------

/// Fixed-width edges starting at the bin boundary at or below `min` and
/// covering `max`.
fn bin_edges(axis: &str, min: f64, max: f64, width: f64) -> Result<Vec<f64>, HazardError> {
    let start = (min / width).floor() * width;
    let n_bins = ((max - start) / width).floor() + 1.0;
    if n_bins > MAX_BINS_PER_AXIS as f64 {
        return Err(HazardError::Validation(format!(
            "A {axis} bin width of {width} needs {n_bins} bins, at most {MAX_BINS_PER_AXIS} allowed"
        )));
    }
    let n_bins = n_bins as usize;
    Ok((0..=n_bins).map(|k| start + k as f64 * width).collect())
}

fn bin_index(value: f64, edges: &[f64]) -> usize {
    let width = edges[1] - edges[0];
    let n_bins = edges.len() - 1;
    let idx = ((value - edges[0]) / width).floor();
    (idx.max(0.0) as usize).min(n_bins - 1)
}

fn epsilon_bin(eps: f64, interior_edges: &[f64]) -> usize {
    interior_edges.partition_point(|&e| e <= eps)
}

/// Bin the shares of `disagg` into magnitude × distance grids.
pub fn run_disagg_gridding(
    disagg: &DisaggResult,
    config: &GridConfig,
) -> Result<DisaggGridResult, HazardError> {
    config.validate()?;
    let contributions = &disagg.contributions;
    if contributions.is_empty() {
        return Err(HazardError::Validation(
            "Cannot grid a disaggregation without contributions".into(),
        ));
    }

    let (mag_min, mag_max) = min_max(contributions.iter().map(|c| c.magnitude));
    let (_, dist_max) = min_max(contributions.iter().map(|c| c.distance));

    let dist_width = config.dist_bin_width.unwrap_or(if dist_max <= NEAR_FIELD_MAX_DISTANCE {
        NEAR_DIST_BIN_WIDTH
    } else {
        FAR_DIST_BIN_WIDTH
    });
    let mag_edges = bin_edges("magnitude", mag_min, mag_max, config.mag_bin_width)?;
    let dist_edges = bin_edges("distance", 0.0, dist_max, dist_width)?;
    let (n_mag, n_dist) = (mag_edges.len() - 1, dist_edges.len() - 1);
    let n_eps = config.epsilon_edges.len() + 1;

    let mut mag_dist = Array2::<f64>::zeros((n_mag, n_dist));
    let mut tectonic = Array3::<f64>::zeros((TectonicType::ALL.len(), n_mag, n_dist));
    let mut source = Array3::<f64>::zeros((SourceType::ALL.len(), n_mag, n_dist));
    let has_epsilon = contributions.iter().all(|c| c.epsilon.is_some());
    let mut epsilon = has_epsilon.then(|| Array3::<f64>::zeros((n_eps, n_mag, n_dist)));
    let mut tectonic_totals = vec![0.0; TectonicType::ALL.len()];
    let mut source_totals = vec![0.0; SourceType::ALL.len()];

    for c in contributions {
        let m = bin_index(c.magnitude, &mag_edges);
        let d = bin_index(c.distance, &dist_edges);
        let t = c.tectonic_type.index();
        let s = c.source_type.index();

        mag_dist[[m, d]] += c.share;
        tectonic[[t, m, d]] += c.share;
        source[[s, m, d]] += c.share;
        tectonic_totals[t] += c.share;
        source_totals[s] += c.share;
        if let (Some(grid), Some(eps)) = (epsilon.as_mut(), c.epsilon) {
            grid[[epsilon_bin(eps, &config.epsilon_edges), m, d]] += c.share;
        }
    }

    Ok(DisaggGridResult {
        im: disagg.im,
        site: disagg.site.clone(),
        exceedance: disagg.exceedance,
        im_level: disagg.im_level,
        mag_edges,
        dist_edges,
        epsilon_edges: config.epsilon_edges.clone(),
        mag_dist,
        tectonic,
        source,
        epsilon,
        tectonic_totals,
        source_totals,
    })
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
