//! Disaggregation of hazard at a target IM level into rupture contributions.
//!
//! The contribution of rupture `i` is `rate_i · P(IM_i > target)`; shares
//! are contributions normalised by their total. For an ensemble the
//! contribution of a rupture is the weighted sum over the branches that
//! carry it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ensemble::{validate_weights, EnsembleHazardResult};
use crate::error::{ErrorCategory, HazardError};
use crate::exceedance::{check_data_type, Branch};
use crate::gm::ImDataType;
use crate::im::Im;
use crate::rupture::{SourceType, TectonicType};
use crate::site::SiteInfo;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Grouping used when presenting a disaggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisaggType {
    TectonicType,
    MagDist,
    MagDistEps,
}

impl DisaggType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TectonicType => "tectonic_type",
            Self::MagDist => "mag_dist",
            Self::MagDistEps => "mag_dist_eps",
        }
    }
}

/// What the disaggregation is conditioned on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisaggTarget {
    /// Annual exceedance rate, inverted on the ensemble mean curve.
    Exceedance(f64),
    ImLevel(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuptureContribution {
    pub rupture_id: String,
    /// Absolute contribution to the exceedance rate at the target level.
    pub contribution: f64,
    /// `contribution / total_rate`.
    pub share: f64,
    pub magnitude: f64,
    pub distance: f64,
    pub epsilon: Option<f64>,
    pub tectonic_type: TectonicType,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisaggResult {
    pub im: Im,
    pub site: SiteInfo,
    /// Set when the target level was derived from an exceedance rate.
    pub exceedance: Option<f64>,
    pub im_level: f64,
    pub total_rate: f64,
    pub contributions: Vec<RuptureContribution>,
    pub mean_magnitude: f64,
    pub mean_distance: f64,
    /// Absent if any contributing rupture has no epsilon.
    pub mean_epsilon: Option<f64>,
}

impl DisaggResult {
    pub fn total_share(&self) -> f64 {
        self.contributions.iter().map(|c| c.share).sum()
    }
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

/// Running contribution of one rupture across branches.
struct Accumulator {
    rupture_id: String,
    magnitude: f64,
    distance: f64,
    tectonic_type: TectonicType,
    source_type: SourceType,
    contribution: f64,
    eps_sum: f64,
    eps_missing: bool,
}

#[derive(Default)]
struct Contributions {
    entries: Vec<Accumulator>,
    index: HashMap<String, usize>,
}

impl Contributions {
    /// Add the weighted contributions of `branch` at `level`.
    fn add_branch(&mut self, branch: &Branch, weight: f64, level: f64) {
        for (rupture, gm) in branch.ruptures.iter().zip(branch.gm.iter()) {
            let contribution = weight * rupture.annual_rate * gm.survival(level);
            if contribution <= 0.0 {
                continue;
            }
            let idx = match self.index.get(&rupture.id) {
                Some(&idx) => idx,
                None => {
                    self.index.insert(rupture.id.clone(), self.entries.len());
                    self.entries.push(Accumulator {
                        rupture_id: rupture.id.clone(),
                        magnitude: rupture.magnitude,
                        distance: rupture.distance,
                        tectonic_type: rupture.tectonic_type,
                        source_type: rupture.source_type,
                        contribution: 0.0,
                        eps_sum: 0.0,
                        eps_missing: false,
                    });
                    self.entries.len() - 1
                }
            };

            let entry = &mut self.entries[idx];
            entry.contribution += contribution;
            match gm.epsilon(level) {
                Some(eps) => entry.eps_sum += contribution * eps,
                None => entry.eps_missing = true,
            }
        }
    }

    fn into_result(
        self,
        im: Im,
        site: SiteInfo,
        exceedance: Option<f64>,
        im_level: f64,
    ) -> Result<DisaggResult, HazardError> {
        let total_rate: f64 = self.entries.iter().map(|e| e.contribution).sum();
        if !(total_rate > 0.0) {
            return Err(HazardError::ExceedanceOutOfRange {
                im,
                exceedance: exceedance.unwrap_or(total_rate),
            });
        }

        let contributions: Vec<RuptureContribution> = self
            .entries
            .into_iter()
            .map(|e| RuptureContribution {
                share: e.contribution / total_rate,
                epsilon: (!e.eps_missing).then(|| e.eps_sum / e.contribution),
                rupture_id: e.rupture_id,
                contribution: e.contribution,
                magnitude: e.magnitude,
                distance: e.distance,
                tectonic_type: e.tectonic_type,
                source_type: e.source_type,
            })
            .collect();

        let mean_magnitude = contributions.iter().map(|c| c.share * c.magnitude).sum();
        let mean_distance = contributions.iter().map(|c| c.share * c.distance).sum();
        let mean_epsilon = contributions
            .iter()
            .map(|c| c.epsilon.map(|eps| c.share * eps))
            .sum::<Option<f64>>();

        Ok(DisaggResult {
            im,
            site,
            exceedance,
            im_level,
            total_rate,
            contributions,
            mean_magnitude,
            mean_distance,
            mean_epsilon,
        })
    }
}

fn check_level(level: f64) -> Result<(), HazardError> {
    if !(level.is_finite() && level > 0.0) {
        return Err(HazardError::Validation(format!(
            "Disaggregation IM level {level} must be finite and positive"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Disaggregation
// ---------------------------------------------------------------------------

/// Disaggregate a single branch at `im_level`.
pub fn run_branch_disagg(
    im: Im,
    site: SiteInfo,
    branch: &Branch,
    im_level: f64,
) -> Result<DisaggResult, HazardError> {
    check_level(im_level)?;
    let mut acc = Contributions::default();
    acc.add_branch(branch, 1.0, im_level);
    acc.into_result(im, site, None, im_level)
}

/// Disaggregate the ensemble behind `hazard`.
///
/// An exceedance target is inverted on the mean curve first. A rate or
/// level outside the curve, or a level at which nothing contributes, fails
/// with [`HazardError::ExceedanceOutOfRange`]. Every branch must carry
/// `expected` ground-motion data unless the caller declared
/// [`ImDataType::Mixed`].
pub fn run_ensemble_disagg(
    hazard: &EnsembleHazardResult,
    branches: &[Branch],
    target: DisaggTarget,
    expected: ImDataType,
) -> Result<DisaggResult, HazardError> {
    let weights: Vec<f64> = branches.iter().map(|b| b.weight).collect();
    validate_weights(&weights)?;
    for branch in branches {
        check_data_type(branch, expected)?;
    }

    let out_of_range = |exceedance: f64| HazardError::ExceedanceOutOfRange {
        im: hazard.im,
        exceedance,
    };
    let (exceedance, im_level) = match target {
        DisaggTarget::Exceedance(rate) => {
            let level = hazard.exceedance_to_im(rate).map_err(|e| {
                if e.category() == ErrorCategory::Domain {
                    out_of_range(rate)
                } else {
                    e
                }
            })?;
            (Some(rate), level)
        }
        DisaggTarget::ImLevel(level) => {
            check_level(level)?;
            if let Err(e) = hazard.im_to_exceedance(level) {
                if e.category() != ErrorCategory::Domain {
                    return Err(e);
                }
                return Err(out_of_range(edge_rate(hazard, level)));
            }
            (None, level)
        }
    };
    check_level(im_level)?;

    let mut acc = Contributions::default();
    for branch in branches {
        acc.add_branch(branch, branch.weight, im_level);
    }
    acc.into_result(hazard.im, hazard.site.clone(), exceedance, im_level)
}

/// Mean rate at the grid end nearest an out-of-range `level`.
fn edge_rate(hazard: &EnsembleHazardResult, level: f64) -> f64 {
    let below = hazard.im_levels.first().is_some_and(|&lo| level < lo);
    let edge = if below {
        hazard.mean.first()
    } else {
        hazard.mean.last()
    };
    edge.copied().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ensemble::{run_ensemble_hazard, AggregateOptions};
    use crate::gm::{EmpiricalSurvival, RuptureGm};
    use crate::rupture::{Rupture, RuptureTable};
    use assert_matches::assert_matches;

    fn site() -> SiteInfo {
        SiteInfo::new("CCCC", -43.53, 172.63, 250.0).unwrap()
    }

    fn rupture(id: &str, rate: f64, magnitude: f64, distance: f64) -> Rupture {
        Rupture {
            id: id.into(),
            name: id.into(),
            annual_rate: rate,
            magnitude,
            tectonic_type: TectonicType::ActiveShallow,
            source_type: SourceType::Fault,
            distance,
        }
    }

    fn table() -> Arc<RuptureTable> {
        Arc::new(
            RuptureTable::new(vec![
                rupture("near", 0.01, 6.0, 10.0),
                rupture("far", 0.02, 7.5, 80.0),
            ])
            .unwrap(),
        )
    }

    fn branch(id: &str, weight: f64, medians: [f64; 2]) -> Branch {
        Branch::new(
            id,
            weight,
            table(),
            medians
                .iter()
                .map(|&m| RuptureGm::parametric(m, 0.5).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn ensemble() -> (Vec<Branch>, EnsembleHazardResult) {
        let branches = vec![branch("a", 0.5, [0.2, 0.1]), branch("b", 0.5, [0.3, 0.05])];
        let levels = crate::im_levels::logspace(0.01, 3.0, 200).unwrap();
        let hazard = run_ensemble_hazard(
            Im::pga(),
            site(),
            &branches,
            &levels,
            ImDataType::Parametric,
            &AggregateOptions::default(),
        )
        .unwrap();
        (branches, hazard)
    }

    // -- single branch --

    #[test]
    fn shares_sum_to_one() {
        let b = branch("a", 1.0, [0.2, 0.1]);
        let result = run_branch_disagg(Im::pga(), site(), &b, 0.2).unwrap();
        assert!((result.total_share() - 1.0).abs() < 1e-9);
        // Median of "near" equals the level: P = 0.5, eps = 0.
        assert!((result.contributions[0].contribution - 0.005).abs() < 1e-12);
        assert!(result.contributions[0].epsilon.unwrap().abs() < 1e-12);
        assert!(result.mean_epsilon.is_some());
    }

    #[test]
    fn means_are_share_weighted() {
        let b = branch("a", 1.0, [0.2, 0.1]);
        let result = run_branch_disagg(Im::pga(), site(), &b, 0.15).unwrap();
        let expected_mag: f64 = result
            .contributions
            .iter()
            .map(|c| c.share * c.magnitude)
            .sum();
        assert!((result.mean_magnitude - expected_mag).abs() < 1e-12);
        assert!(result.mean_magnitude > 6.0 && result.mean_magnitude < 7.5);
        assert!(result.mean_distance > 10.0 && result.mean_distance < 80.0);
    }

    #[test]
    fn zero_total_is_out_of_range() {
        let b = Branch::new(
            "step",
            1.0,
            table(),
            vec![
                RuptureGm::parametric(0.1, 0.0).unwrap(),
                RuptureGm::parametric(0.1, 0.0).unwrap(),
            ],
        )
        .unwrap();
        assert_matches!(
            run_branch_disagg(Im::pga(), site(), &b, 0.5),
            Err(HazardError::ExceedanceOutOfRange { .. })
        );
    }

    #[test]
    fn non_parametric_has_no_epsilon() {
        let empirical = EmpiricalSurvival::from_samples(vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let b = Branch::new(
            "np",
            1.0,
            table(),
            vec![
                RuptureGm::NonParametric(empirical.clone()),
                RuptureGm::NonParametric(empirical),
            ],
        )
        .unwrap();
        let result = run_branch_disagg(Im::pga(), site(), &b, 0.15).unwrap();
        assert!(result.contributions.iter().all(|c| c.epsilon.is_none()));
        assert!(result.mean_epsilon.is_none());
    }

    #[test]
    fn invalid_level_rejected() {
        let b = branch("a", 1.0, [0.2, 0.1]);
        assert_matches!(
            run_branch_disagg(Im::pga(), site(), &b, 0.0),
            Err(HazardError::Validation(_))
        );
    }

    // -- ensemble --

    #[test]
    fn ensemble_contributions_are_weighted_sums() {
        let (branches, hazard) = ensemble();
        let result = run_ensemble_disagg(
            &hazard,
            &branches,
            DisaggTarget::ImLevel(0.2),
            ImDataType::Parametric,
        )
        .unwrap();
        let a = run_branch_disagg(Im::pga(), site(), &branches[0], 0.2).unwrap();
        let b = run_branch_disagg(Im::pga(), site(), &branches[1], 0.2).unwrap();
        let expected = 0.5 * a.total_rate + 0.5 * b.total_rate;
        assert!((result.total_rate - expected).abs() < 1e-12);
        assert!((result.total_share() - 1.0).abs() < 1e-9);
        assert!(result.exceedance.is_none());
    }

    #[test]
    fn exceedance_target_matches_mean_curve() {
        let (branches, hazard) = ensemble();
        let rate = 1e-3;
        let result = run_ensemble_disagg(
            &hazard,
            &branches,
            DisaggTarget::Exceedance(rate),
            ImDataType::Parametric,
        )
        .unwrap();
        assert_eq!(result.exceedance, Some(rate));
        // Ensemble contributions at the inverted level reproduce the target rate.
        assert!((result.total_rate - rate).abs() / rate < 1e-2);
    }

    #[test]
    fn exceedance_outside_curve_is_out_of_range() {
        let (branches, hazard) = ensemble();
        assert_matches!(
            run_ensemble_disagg(
                &hazard,
                &branches,
                DisaggTarget::Exceedance(10.0),
                ImDataType::Parametric,
            ),
            Err(HazardError::ExceedanceOutOfRange { exceedance, .. }) if exceedance == 10.0
        );
    }

    #[test]
    fn ensemble_epsilon_is_contribution_weighted() {
        let (branches, hazard) = ensemble();
        let result = run_ensemble_disagg(
            &hazard,
            &branches,
            DisaggTarget::ImLevel(0.2),
            ImDataType::Parametric,
        )
        .unwrap();
        let near = &result.contributions[0];
        let eps_a = (0.2f64.ln() - 0.2f64.ln()) / 0.5;
        let eps_b = (0.2f64.ln() - 0.3f64.ln()) / 0.5;
        let eps = near.epsilon.unwrap();
        assert!(eps < eps_a && eps > eps_b);
    }

    #[test]
    fn level_outside_curve_is_out_of_range() {
        let (branches, hazard) = ensemble();
        let first_rate = hazard.mean[0];
        assert_matches!(
            run_ensemble_disagg(
                &hazard,
                &branches,
                DisaggTarget::ImLevel(0.001),
                ImDataType::Parametric,
            ),
            Err(HazardError::ExceedanceOutOfRange { exceedance, .. }) if exceedance == first_rate
        );
        assert_matches!(
            run_ensemble_disagg(
                &hazard,
                &branches,
                DisaggTarget::ImLevel(5.0),
                ImDataType::Parametric,
            ),
            Err(HazardError::ExceedanceOutOfRange { .. })
        );
    }

    #[test]
    fn undeclared_mixed_data_rejected() {
        let (mut branches, hazard) = ensemble();
        let empirical = EmpiricalSurvival::from_samples(vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        branches[1] = Branch::new(
            "np",
            0.5,
            table(),
            vec![
                RuptureGm::NonParametric(empirical.clone()),
                RuptureGm::NonParametric(empirical),
            ],
        )
        .unwrap();
        assert_matches!(
            run_ensemble_disagg(
                &hazard,
                &branches,
                DisaggTarget::ImLevel(0.2),
                ImDataType::Parametric,
            ),
            Err(HazardError::MixedDataType { .. })
        );
        let result =
            run_ensemble_disagg(&hazard, &branches, DisaggTarget::ImLevel(0.2), ImDataType::Mixed)
                .unwrap();
        assert!((result.total_share() - 1.0).abs() < 1e-9);
    }
}
