//! Per-branch exceedance curve construction.
//!
//! A branch pairs a rupture table with the ground-motion output for one
//! IM. Its exceedance curve at level `x` is `Σ rate_i · P(IM_i > x)`,
//! split into fault and distributed-seismicity contributions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::HazardError;
use crate::gm::{GmTable, ImDataType, RuptureGm};
use crate::interpolate::{validate_im_levels, validate_rates, HazardCurve};
use crate::rupture::{RuptureTable, SourceType};

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

/// One logic-tree branch for a single site and IM.
///
/// The rupture table is shared between the IMs of a site, hence the `Arc`.
#[derive(Debug, Clone)]
pub struct Branch {
    pub id: String,
    pub weight: f64,
    pub ruptures: Arc<RuptureTable>,
    pub gm: GmTable,
}

impl Branch {
    pub fn new(
        id: impl Into<String>,
        weight: f64,
        ruptures: Arc<RuptureTable>,
        gm_values: Vec<RuptureGm>,
    ) -> Result<Self, HazardError> {
        let id = id.into();
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(HazardError::Validation(format!(
                "Branch {id} weight {weight} is outside (0, 1]"
            )));
        }
        let gm = GmTable::new(&ruptures, gm_values)?;
        Ok(Self {
            id,
            weight,
            ruptures,
            gm,
        })
    }

    pub fn data_type(&self) -> ImDataType {
        self.gm.data_type()
    }
}

/// Combined data type over every branch of an ensemble.
pub fn ensemble_data_type(branches: &[Branch]) -> ImDataType {
    branches
        .iter()
        .map(Branch::data_type)
        .reduce(ImDataType::merge)
        .unwrap_or(ImDataType::Parametric)
}

/// Fail unless the branch's data matches what the caller declared.
///
/// Declaring [`ImDataType::Mixed`] accepts any branch.
pub fn check_data_type(branch: &Branch, expected: ImDataType) -> Result<(), HazardError> {
    let found = branch.data_type();
    if expected != ImDataType::Mixed && found != expected {
        return Err(HazardError::MixedDataType {
            branch_id: branch.id.clone(),
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// BranchHazardResult
// ---------------------------------------------------------------------------

/// Exceedance curve of one branch, with its source-type split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchHazardResult {
    pub branch_id: String,
    pub weight: f64,
    pub im_levels: Vec<f64>,
    pub rates: Vec<f64>,
    pub fault_rates: Vec<f64>,
    pub ds_rates: Vec<f64>,
}

impl BranchHazardResult {
    pub fn curve(&self) -> Result<HazardCurve, HazardError> {
        HazardCurve::new(self.im_levels.clone(), self.rates.clone())
    }

    /// Re-express this branch on `im_levels` by log-log interpolation.
    ///
    /// Every level must lie within the branch's current grid.
    pub fn resample(&self, im_levels: &[f64]) -> Result<Self, HazardError> {
        let resample = |rates: &[f64]| -> Result<Vec<f64>, HazardError> {
            let curve = HazardCurve::new(self.im_levels.clone(), rates.to_vec())?;
            Ok(curve.resample(im_levels)?.rates().to_vec())
        };
        Ok(Self {
            branch_id: self.branch_id.clone(),
            weight: self.weight,
            im_levels: im_levels.to_vec(),
            rates: resample(&self.rates)?,
            fault_rates: resample(&self.fault_rates)?,
            ds_rates: resample(&self.ds_rates)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Build the exceedance curve of `branch` over `im_levels`.
///
/// Fails with `MixedDataType` before any computation when the branch data
/// does not match `expected`, and with `DataIntegrity` when the resulting
/// curve increases anywhere.
pub fn build_branch_curve(
    branch: &Branch,
    im_levels: &[f64],
    expected: ImDataType,
) -> Result<BranchHazardResult, HazardError> {
    check_data_type(branch, expected)?;
    validate_im_levels(im_levels)?;

    let n = im_levels.len();
    let mut fault_rates = vec![0.0; n];
    let mut ds_rates = vec![0.0; n];

    for (rupture, gm) in branch.ruptures.iter().zip(branch.gm.iter()) {
        if rupture.annual_rate == 0.0 {
            continue;
        }
        let target = match rupture.source_type {
            SourceType::Fault => &mut fault_rates,
            SourceType::Distributed => &mut ds_rates,
        };
        for (acc, &level) in target.iter_mut().zip(im_levels) {
            *acc += rupture.annual_rate * gm.survival(level);
        }
    }

    let rates: Vec<f64> = fault_rates
        .iter()
        .zip(&ds_rates)
        .map(|(f, d)| f + d)
        .collect();

    validate_rates(&rates).map_err(|e| match e {
        HazardError::DataIntegrity(msg) => {
            HazardError::DataIntegrity(format!("Branch {}: {msg}", branch.id))
        }
        other => other,
    })?;

    Ok(BranchHazardResult {
        branch_id: branch.id.clone(),
        weight: branch.weight,
        im_levels: im_levels.to_vec(),
        rates,
        fault_rates,
        ds_rates,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
