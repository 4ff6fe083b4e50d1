//! Uniform hazard spectra.
//!
//! A UHS reads the IM level at a fixed exceedance rate off the ensemble
//! mean curve of PGA and every pSA period of a site. PGA is plotted at
//! period 0.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ensemble::EnsembleHazardResult;
use crate::error::{ErrorCategory, HazardError};
use crate::im::{ImComponent, ImType, Period};
use crate::interpolate::exceedance_to_rp;
use crate::site::SiteInfo;

/// Return periods (years) a UHS is computed for by default.
pub const DEFAULT_UHS_RPS: [f64; 10] = [
    25.0, 50.0, 100.0, 150.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UhsPoint {
    pub period: f64,
    /// Absent when the rate is outside that period's hazard curve.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UhsResult {
    pub site: SiteInfo,
    pub component: ImComponent,
    pub exceedance: f64,
    /// Ordered by period.
    pub points: Vec<UhsPoint>,
}

impl UhsResult {
    pub fn return_period(&self) -> f64 {
        exceedance_to_rp(self.exceedance)
    }

    pub fn periods(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.period).collect()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

fn spectral_period(hazard: &EnsembleHazardResult) -> Result<f64, HazardError> {
    match hazard.im.im_type() {
        ImType::Pga => Ok(0.0),
        ImType::PSa(period) => Ok(period.seconds()),
        _ => Err(HazardError::UnsupportedIm {
            im: hazard.im.to_string(),
            reason: "only PGA and pSA can form a spectrum".into(),
        }),
    }
}

/// Build one spectrum per exceedance rate from the hazard of a single site.
///
/// Every hazard result must be PGA or pSA, for the same site and
/// component, with no repeated period.
pub fn build_uhs(
    hazards: &[EnsembleHazardResult],
    exceedances: &[f64],
) -> Result<Vec<UhsResult>, HazardError> {
    let Some(first) = hazards.first() else {
        return Err(HazardError::Validation(
            "A UHS needs at least one hazard result".into(),
        ));
    };

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(hazards.len());
    for hazard in hazards {
        let period = spectral_period(hazard)?;
        if hazard.site != first.site {
            return Err(HazardError::Validation(format!(
                "Hazard for {} belongs to station {}, expected {}",
                hazard.im, hazard.site.station_name, first.site.station_name
            )));
        }
        if hazard.im.component() != first.im.component() {
            return Err(HazardError::Validation(format!(
                "Hazard for {} has component {}, expected {}",
                hazard.im,
                hazard.im.component(),
                first.im.component()
            )));
        }
        if !seen.insert(period.to_bits()) {
            return Err(HazardError::Validation(format!(
                "Period {period} appears more than once"
            )));
        }
        columns.push((period, hazard.mean_curve()?));
    }
    columns.sort_by(|a, b| a.0.total_cmp(&b.0));

    exceedances
        .iter()
        .map(|&exceedance| {
            if !(exceedance.is_finite() && exceedance > 0.0) {
                return Err(HazardError::Validation(format!(
                    "UHS exceedance {exceedance} must be finite and positive"
                )));
            }
            let points = columns
                .iter()
                .map(|(period, curve)| {
                    let value = match curve.exceedance_to_im(exceedance) {
                        Ok(level) => Some(level),
                        Err(e) if e.category() == ErrorCategory::Domain => None,
                        Err(e) => return Err(e),
                    };
                    Ok(UhsPoint {
                        period: *period,
                        value,
                    })
                })
                .collect::<Result<Vec<_>, HazardError>>()?;
            Ok(UhsResult {
                site: first.site.clone(),
                component: first.im.component(),
                exceedance,
                points,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Design spectra
// ---------------------------------------------------------------------------

/// Code-based design spectrum, e.g. a building-standard spectrum for the
/// site's soil class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSpectrum {
    pub name: String,
    /// `(period, value)` pairs.
    pub points: Vec<(f64, f64)>,
}

/// Provider of design spectra to compare a UHS against.
pub trait DesignSpectrumSource {
    fn design_spectrum(
        &self,
        site: &SiteInfo,
        exceedance: f64,
        periods: &[Period],
    ) -> Result<DesignSpectrum, HazardError>;
}

/// A UHS paired with the design spectra at the same exceedance rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UhsComparison {
    pub uhs: UhsResult,
    pub design: Vec<DesignSpectrum>,
}

/// Pair `uhs` with the output of every source. Period 0 (PGA) is not
/// requested from the sources.
pub fn compare_with_design(
    uhs: UhsResult,
    sources: &[&dyn DesignSpectrumSource],
) -> Result<UhsComparison, HazardError> {
    let periods = uhs
        .points
        .iter()
        .filter(|p| p.period > 0.0)
        .map(|p| Period::new(p.period))
        .collect::<Result<Vec<_>, _>>()?;
    let design = sources
        .iter()
        .map(|source| source.design_spectrum(&uhs.site, uhs.exceedance, &periods))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(UhsComparison { uhs, design })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
