//! Project input: stations, IMs and the branch data of every station.
//!
//! The project is a single JSON document:
//!
//! ```json
//! {
//!   "data_type": "parametric",
//!   "component": "RotD50",
//!   "ims": ["PGA", "pSA_0.5"],
//!   "sites": [{
//!     "site": { "name": "CCCC", "lat": -43.53, "lon": 172.63, "vs30": 250.0 },
//!     "branches": [{
//!       "id": "b1",
//!       "weight": 1.0,
//!       "ruptures": [{ "id": "r1", "name": "r1", "annual_rate": 0.01, ... }],
//!       "ground_motions": { "PGA": [{ "parametric": { "median": 0.2, "sigma": 0.5 } }] }
//!     }]
//!   }]
//! }
//! ```
//!
//! Ground motions are aligned with the branch's rupture list and keyed by
//! canonical IM string.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use hazard_core::exceedance::Branch;
use hazard_core::gm::{ImDataType, RuptureGm};
use hazard_core::im::{Im, ImComponent};
use hazard_core::rupture::RuptureTable;
use hazard_core::site::SiteInfo;
use hazard_core::HazardError;

use crate::error::WorkerError;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProjectFile {
    #[serde(default = "default_data_type")]
    data_type: ImDataType,
    #[serde(default)]
    component: ImComponent,
    ims: Vec<String>,
    sites: Vec<SiteFile>,
}

fn default_data_type() -> ImDataType {
    ImDataType::Parametric
}

#[derive(Debug, Deserialize)]
struct SiteFile {
    site: SiteInfo,
    branches: Vec<BranchFile>,
}

#[derive(Debug, Deserialize)]
struct BranchFile {
    id: String,
    weight: f64,
    ruptures: RuptureTable,
    ground_motions: BTreeMap<String, Vec<RuptureGm>>,
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// Branch inputs of one station, ready to be turned into per-IM branches.
#[derive(Debug)]
pub struct BranchInput {
    pub id: String,
    pub weight: f64,
    pub ruptures: Arc<RuptureTable>,
    pub ground_motions: HashMap<Im, Vec<RuptureGm>>,
}

#[derive(Debug)]
pub struct SiteProject {
    pub site: SiteInfo,
    pub branches: Vec<BranchInput>,
}

impl SiteProject {
    /// The station's branches for `im`.
    pub fn branches_for(&self, im: &Im) -> Result<Vec<Branch>, HazardError> {
        self.branches
            .iter()
            .map(|b| {
                let values = b.ground_motions.get(im).ok_or_else(|| {
                    HazardError::Validation(format!(
                        "Branch {} of station {} has no ground motions for {im}",
                        b.id, self.site.station_name
                    ))
                })?;
                Branch::new(b.id.clone(), b.weight, b.ruptures.clone(), values.clone())
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct Project {
    /// Declared ground-motion data type; `mixed` is an explicit opt-in.
    pub data_type: ImDataType,
    pub ims: Vec<Im>,
    pub sites: Vec<SiteProject>,
}

impl Project {
    pub fn load(path: &Path) -> Result<Self, WorkerError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WorkerError::ProjectIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            WorkerError::Project { reason, .. } => WorkerError::Project {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, WorkerError> {
        let invalid = |reason: String| WorkerError::Project {
            path: Default::default(),
            reason,
        };
        let file: ProjectFile = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;

        let ims = file
            .ims
            .iter()
            .map(|name| Im::from_str_with_component(name, file.component.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        if ims.is_empty() {
            return Err(invalid("no IMs requested".into()));
        }

        let mut sites = Vec::with_capacity(file.sites.len());
        for site_file in file.sites {
            site_file.site.validate()?;
            if site_file.branches.is_empty() {
                return Err(invalid(format!(
                    "station {} has no branches",
                    site_file.site.station_name
                )));
            }
            let branches = site_file
                .branches
                .into_iter()
                .map(|b| {
                    let ground_motions = b
                        .ground_motions
                        .into_iter()
                        .map(|(name, values)| {
                            let im = Im::from_str_with_component(&name, file.component.as_str())?;
                            Ok((im, values))
                        })
                        .collect::<Result<HashMap<_, _>, HazardError>>()?;
                    Ok(BranchInput {
                        id: b.id,
                        weight: b.weight,
                        ruptures: Arc::new(b.ruptures),
                        ground_motions,
                    })
                })
                .collect::<Result<Vec<_>, HazardError>>()?;
            sites.push(SiteProject {
                site: site_file.site,
                branches,
            });
        }

        Ok(Self {
            data_type: file.data_type,
            ims,
            sites,
        })
    }

    /// Number of (station, IM) units in the project.
    pub fn n_units(&self) -> usize {
        self.sites.len() * self.ims.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const PROJECT: &str = r#"{
        "ims": ["PGA", "pSA_0p5"],
        "sites": [{
            "site": { "name": "CCCC", "lat": -43.53, "lon": 172.63, "vs30": 250.0 },
            "branches": [{
                "id": "b1",
                "weight": 1.0,
                "ruptures": [{
                    "id": "r1", "name": "r1", "annual_rate": 0.01, "magnitude": 6.5,
                    "tectonic_type": "active_shallow", "source_type": "flt", "distance": 20.0
                }],
                "ground_motions": {
                    "PGA": [{ "parametric": { "median": 0.2, "sigma": 0.5 } }],
                    "pSA_0.5": [{ "parametric": { "median": 0.3, "sigma": 0.6 } }]
                }
            }]
        }]
    }"#;

    #[test]
    fn parses_project() {
        let project = Project::from_json(PROJECT).unwrap();
        assert_eq!(project.data_type, ImDataType::Parametric);
        assert_eq!(project.ims, vec![Im::pga(), Im::psa(0.5).unwrap()]);
        assert_eq!(project.n_units(), 2);

        let branches = project.sites[0].branches_for(&Im::psa(0.5).unwrap()).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].ruptures.len(), 1);
    }

    #[test]
    fn missing_ground_motions_rejected() {
        let project = Project::from_json(PROJECT).unwrap();
        assert_matches!(
            project.sites[0].branches_for(&Im::psa(1.0).unwrap()),
            Err(HazardError::Validation(_))
        );
    }

    #[test]
    fn unknown_im_rejected() {
        let raw = PROJECT.replace(r#""PGA", "pSA_0p5""#, r#""PGA", "XYZ""#);
        assert_matches!(
            Project::from_json(&raw),
            Err(WorkerError::Hazard(HazardError::UnsupportedIm { .. }))
        );
    }

    #[test]
    fn malformed_json_rejected() {
        assert_matches!(
            Project::from_json("{\"ims\": []"),
            Err(WorkerError::Project { .. })
        );
    }
}
