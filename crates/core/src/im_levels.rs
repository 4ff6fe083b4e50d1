//! Default IM-level grids.
//!
//! Every IM type (and pSA period band) has a fixed `[min, max]` range that
//! is log-spaced into the working grid used for curve construction and
//! interpolation. Velocities are in cm/s, accelerations in g (CAV in
//! cm/s), durations in seconds.

use crate::error::HazardError;
use crate::im::{Im, ImType};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default number of points in a generated grid.
pub const DEFAULT_N_IM_LEVELS: usize = 100;

/// Number of points used for the extended level option.
pub const EXTENDED_N_IM_LEVELS: usize = 200;

/// Gravitational acceleration in cm/s^2, used to express the CAV band.
const G_CM_S2: f64 = 980.0;

/// Fixed level list of the national seismic hazard model (in g).
pub const NSHM_IM_LEVELS: &[f64] = &[
    0.0001, 0.0002, 0.0004, 0.0006, 0.0008, 0.001, 0.002, 0.004, 0.006, 0.008, 0.01, 0.02, 0.04,
    0.06, 0.08, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 1.2, 1.4, 1.6, 1.8, 2.0, 2.2,
    2.4, 2.6, 2.8, 3.0, 3.5, 4.0, 4.5, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0,
];

/// Which level set a hazard run should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImLevelOption {
    Nshm,
    #[default]
    Extended,
}

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

/// `[min, max]` of the default grid for `im`.
///
/// ASI, DSI, SI and pSA periods above 10 s have no band.
pub fn level_bounds(im: &Im) -> Result<(f64, f64), HazardError> {
    let bounds = match im.im_type() {
        ImType::PSa(period) => match period.seconds() {
            p if p <= 0.5 => Some((0.005, 10.0)),
            p if p <= 1.0 => Some((0.005, 7.5)),
            p if p <= 3.0 => Some((0.0005, 5.0)),
            p if p <= 5.0 => Some((0.0005, 4.0)),
            p if p <= 10.0 => Some((0.0005, 3.0)),
            _ => None,
        },
        ImType::Pga => Some((0.0001, 10.0)),
        ImType::Pgv => Some((1.0, 400.0)),
        ImType::Cav => Some((0.0001 * G_CM_S2, 20.0 * G_CM_S2)),
        ImType::Ai => Some((0.01, 1000.0)),
        ImType::Ds575 | ImType::Ds595 => Some((1.0, 400.0)),
        ImType::Asi | ImType::Dsi | ImType::Si => None,
    };

    bounds.ok_or_else(|| HazardError::UnsupportedIm {
        im: im.to_string(),
        reason: "no default IM-level band is defined".into(),
    })
}

/// `n` log-spaced values from `start` to `end` inclusive.
pub fn logspace(start: f64, end: f64, n: usize) -> Result<Vec<f64>, HazardError> {
    if n < 2 {
        return Err(HazardError::Validation(format!(
            "An IM-level grid needs at least 2 points, got {n}"
        )));
    }
    if !(start > 0.0 && end > start && end.is_finite()) {
        return Err(HazardError::Validation(format!(
            "Log-spaced grid requires 0 < start < end, got [{start}, {end}]"
        )));
    }

    let (ln_start, ln_end) = (start.ln(), end.ln());
    let step = (ln_end - ln_start) / (n - 1) as f64;
    let mut levels: Vec<f64> = (0..n).map(|i| (ln_start + step * i as f64).exp()).collect();
    // Pin the endpoints so the grid bounds are exact.
    levels[0] = start;
    levels[n - 1] = end;
    Ok(levels)
}

/// Default grid of `n` levels for `im`.
pub fn default_im_levels(im: &Im, n: usize) -> Result<Vec<f64>, HazardError> {
    let (start, end) = level_bounds(im)?;
    logspace(start, end, n)
}

/// Grid for `im` under the given option.
pub fn im_levels_for_option(im: &Im, option: ImLevelOption) -> Result<Vec<f64>, HazardError> {
    match option {
        ImLevelOption::Nshm => Ok(NSHM_IM_LEVELS.to_vec()),
        ImLevelOption::Extended => default_im_levels(im, EXTENDED_N_IM_LEVELS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pga_band() {
        assert_eq!(level_bounds(&Im::pga()).unwrap(), (0.0001, 10.0));
    }

    #[test]
    fn psa_bands_follow_period() {
        let band = |p: f64| level_bounds(&Im::psa(p).unwrap()).unwrap();
        assert_eq!(band(0.1), (0.005, 10.0));
        assert_eq!(band(0.5), (0.005, 10.0));
        assert_eq!(band(0.75), (0.005, 7.5));
        assert_eq!(band(2.0), (0.0005, 5.0));
        assert_eq!(band(4.0), (0.0005, 4.0));
        assert_eq!(band(10.0), (0.0005, 3.0));
    }

    #[test]
    fn unbanded_ims_are_unsupported() {
        let long_period = Im::psa(12.0).unwrap();
        assert_matches!(
            level_bounds(&long_period),
            Err(HazardError::UnsupportedIm { .. })
        );
        let asi: Im = "ASI".parse().unwrap();
        assert_matches!(
            default_im_levels(&asi, 10),
            Err(HazardError::UnsupportedIm { .. })
        );
    }

    #[test]
    fn default_grid_is_log_spaced() {
        let levels = default_im_levels(&Im::pga(), DEFAULT_N_IM_LEVELS).unwrap();
        assert_eq!(levels.len(), DEFAULT_N_IM_LEVELS);
        assert_eq!(levels[0], 0.0001);
        assert_eq!(levels[DEFAULT_N_IM_LEVELS - 1], 10.0);
        let ratio = levels[1] / levels[0];
        for w in levels.windows(2) {
            assert!(w[1] > w[0]);
            assert!((w[1] / w[0] - ratio).abs() < 1e-9);
        }
    }

    #[test]
    fn logspace_rejects_degenerate_input() {
        assert!(logspace(0.1, 1.0, 1).is_err());
        assert!(logspace(0.0, 1.0, 10).is_err());
        assert!(logspace(1.0, 0.5, 10).is_err());
    }

    #[test]
    fn level_options() {
        let nshm = im_levels_for_option(&Im::pga(), ImLevelOption::Nshm).unwrap();
        assert_eq!(nshm.len(), NSHM_IM_LEVELS.len());
        assert!(nshm.windows(2).all(|w| w[0] < w[1]));

        let ext = im_levels_for_option(&Im::pga(), ImLevelOption::Extended).unwrap();
        assert_eq!(ext.len(), EXTENDED_N_IM_LEVELS);
    }
}
