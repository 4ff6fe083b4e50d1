//! Save / load of result objects to result directories.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{Array2, Array3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use hazard_core::disagg::{DisaggResult, RuptureContribution};
use hazard_core::disagg_grid::DisaggGridResult;
use hazard_core::ensemble::{EnsembleHazardResult, PercentileCurve};
use hazard_core::im::{Im, ImComponent};
use hazard_core::interpolate::validate_im_levels;
use hazard_core::rupture::{SourceType, TectonicType};
use hazard_core::site::SiteInfo;
use hazard_core::uhs::{UhsPoint, UhsResult};
use hazard_core::HazardError;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const METADATA_FILE: &str = "metadata.json";
pub const HAZARD_STATS_FILE: &str = "hazard_stats.json";
pub const DISAGG_CONTRIBUTIONS_FILE: &str = "disagg_contributions.json";
pub const DISAGG_GRID_FILE: &str = "disagg_grid.json";
pub const UHS_FILE: &str = "uhs.json";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A result that round-trips through a directory.
pub trait Persist: Sized {
    fn save(&self, dir: &Path) -> Result<(), StoreError>;
    fn load(dir: &Path) -> Result<Self, StoreError>;
}

/// `true` if `dir` holds a saved result.
pub fn is_saved(dir: &Path) -> bool {
    dir.join(METADATA_FILE).is_file()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let file = File::create(path).map_err(|e| StoreError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| StoreError::json(path, e))?;
    writer.flush().map_err(|e| StoreError::io(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| StoreError::json(path, e))
}

fn save_pair<M: Serialize, S: Serialize>(
    dir: &Path,
    metadata: &M,
    stats_file: &str,
    stats: &S,
) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    write_json(&dir.join(stats_file), stats)?;
    // Metadata last: its presence marks a complete save.
    write_json(&dir.join(METADATA_FILE), metadata)?;
    tracing::debug!(dir = %dir.display(), stats_file, "Result saved");
    Ok(())
}

fn parse_im(im: &str, component: ImComponent) -> Result<Im, StoreError> {
    Ok(Im::from_str_with_component(im, component.as_str())?)
}

// ---------------------------------------------------------------------------
// EnsembleHazardResult
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct HazardMetadata {
    im: String,
    component: ImComponent,
    site: SiteInfo,
    /// Label → percentile (percent) of the stored percentile columns.
    #[serde(default)]
    percentiles: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HazardRow {
    im_level: f64,
    mean: f64,
    fault: f64,
    distributed: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    percentiles: BTreeMap<String, f64>,
}

impl Persist for EnsembleHazardResult {
    fn save(&self, dir: &Path) -> Result<(), StoreError> {
        let curves = self.percentiles.as_deref().unwrap_or_default();
        let rows: Vec<HazardRow> = self
            .im_levels
            .iter()
            .enumerate()
            .map(|(i, &im_level)| HazardRow {
                im_level,
                mean: self.mean[i],
                fault: self.fault_mean[i],
                distributed: self.ds_mean[i],
                percentiles: curves
                    .iter()
                    .map(|c| (c.label.clone(), c.rates[i]))
                    .collect(),
            })
            .collect();

        let metadata = HazardMetadata {
            im: self.im.to_string(),
            component: self.im.component(),
            site: self.site.clone(),
            percentiles: self.percentiles.as_ref().map(|curves| {
                curves
                    .iter()
                    .map(|c| (c.label.clone(), c.percentile))
                    .collect()
            }),
        };
        save_pair(dir, &metadata, HAZARD_STATS_FILE, &rows)
    }

    fn load(dir: &Path) -> Result<Self, StoreError> {
        let metadata: HazardMetadata = read_json(&dir.join(METADATA_FILE))?;
        let rows: Vec<HazardRow> = read_json(&dir.join(HAZARD_STATS_FILE))?;

        let im_levels: Vec<f64> = rows.iter().map(|r| r.im_level).collect();
        validate_im_levels(&im_levels)?;

        let percentiles = metadata
            .percentiles
            .map(|labels| {
                labels
                    .into_iter()
                    .map(|(label, percentile)| {
                        let rates = rows
                            .iter()
                            .map(|r| {
                                r.percentiles.get(&label).copied().ok_or_else(|| {
                                    HazardError::DataIntegrity(format!(
                                        "Percentile column {label} missing at IM level {}",
                                        r.im_level
                                    ))
                                })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(PercentileCurve {
                            label,
                            percentile,
                            rates,
                        })
                    })
                    .collect::<Result<Vec<_>, HazardError>>()
            })
            .transpose()?
            .map(|mut curves| {
                curves.sort_by(|a, b| a.percentile.total_cmp(&b.percentile));
                curves
            });

        Ok(Self {
            im: parse_im(&metadata.im, metadata.component)?,
            site: metadata.site,
            im_levels,
            mean: rows.iter().map(|r| r.mean).collect(),
            fault_mean: rows.iter().map(|r| r.fault).collect(),
            ds_mean: rows.iter().map(|r| r.distributed).collect(),
            percentiles,
        })
    }
}

// ---------------------------------------------------------------------------
// DisaggResult
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct DisaggMetadata {
    im: String,
    component: ImComponent,
    site: SiteInfo,
    exceedance: Option<f64>,
    im_level: f64,
    total_rate: f64,
    mean_magnitude: f64,
    mean_distance: f64,
    mean_epsilon: Option<f64>,
}

impl Persist for DisaggResult {
    fn save(&self, dir: &Path) -> Result<(), StoreError> {
        let metadata = DisaggMetadata {
            im: self.im.to_string(),
            component: self.im.component(),
            site: self.site.clone(),
            exceedance: self.exceedance,
            im_level: self.im_level,
            total_rate: self.total_rate,
            mean_magnitude: self.mean_magnitude,
            mean_distance: self.mean_distance,
            mean_epsilon: self.mean_epsilon,
        };
        save_pair(dir, &metadata, DISAGG_CONTRIBUTIONS_FILE, &self.contributions)
    }

    fn load(dir: &Path) -> Result<Self, StoreError> {
        let metadata: DisaggMetadata = read_json(&dir.join(METADATA_FILE))?;
        let contributions: Vec<RuptureContribution> =
            read_json(&dir.join(DISAGG_CONTRIBUTIONS_FILE))?;
        Ok(Self {
            im: parse_im(&metadata.im, metadata.component)?,
            site: metadata.site,
            exceedance: metadata.exceedance,
            im_level: metadata.im_level,
            total_rate: metadata.total_rate,
            contributions,
            mean_magnitude: metadata.mean_magnitude,
            mean_distance: metadata.mean_distance,
            mean_epsilon: metadata.mean_epsilon,
        })
    }
}

// ---------------------------------------------------------------------------
// DisaggGridResult
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct GridMetadata {
    im: String,
    component: ImComponent,
    site: SiteInfo,
    exceedance: Option<f64>,
    im_level: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct GridRecord {
    mag_edges: Vec<f64>,
    dist_edges: Vec<f64>,
    epsilon_edges: Vec<f64>,
    mag_dist: Array2<f64>,
    tectonic: Array3<f64>,
    source: Array3<f64>,
    epsilon: Option<Array3<f64>>,
    tectonic_totals: Vec<f64>,
    source_totals: Vec<f64>,
}

impl GridRecord {
    /// Every grid and totals vector must agree with the bin edges.
    fn check_shapes(&self) -> Result<(), HazardError> {
        let n_mag = self.mag_edges.len().saturating_sub(1);
        let n_dist = self.dist_edges.len().saturating_sub(1);
        let n_tect = TectonicType::ALL.len();
        let n_src = SourceType::ALL.len();
        let mismatch = |name: &str, found: String, expected: String| {
            HazardError::DataIntegrity(format!(
                "Grid {name} has shape {found}, expected {expected}"
            ))
        };

        if self.mag_dist.dim() != (n_mag, n_dist) {
            return Err(mismatch(
                "mag_dist",
                format!("{:?}", self.mag_dist.dim()),
                format!("{:?}", (n_mag, n_dist)),
            ));
        }
        let mut stacks = vec![
            ("tectonic", &self.tectonic, n_tect),
            ("source", &self.source, n_src),
        ];
        if let Some(epsilon) = &self.epsilon {
            stacks.push(("epsilon", epsilon, self.epsilon_edges.len() + 1));
        }
        for (name, grid, n_cat) in stacks {
            if grid.dim() != (n_cat, n_mag, n_dist) {
                return Err(mismatch(
                    name,
                    format!("{:?}", grid.dim()),
                    format!("{:?}", (n_cat, n_mag, n_dist)),
                ));
            }
        }
        for (name, totals, n_cat) in [
            ("tectonic_totals", &self.tectonic_totals, n_tect),
            ("source_totals", &self.source_totals, n_src),
        ] {
            if totals.len() != n_cat {
                return Err(mismatch(name, totals.len().to_string(), n_cat.to_string()));
            }
        }
        Ok(())
    }
}

impl Persist for DisaggGridResult {
    fn save(&self, dir: &Path) -> Result<(), StoreError> {
        let metadata = GridMetadata {
            im: self.im.to_string(),
            component: self.im.component(),
            site: self.site.clone(),
            exceedance: self.exceedance,
            im_level: self.im_level,
        };
        let record = GridRecord {
            mag_edges: self.mag_edges.clone(),
            dist_edges: self.dist_edges.clone(),
            epsilon_edges: self.epsilon_edges.clone(),
            mag_dist: self.mag_dist.clone(),
            tectonic: self.tectonic.clone(),
            source: self.source.clone(),
            epsilon: self.epsilon.clone(),
            tectonic_totals: self.tectonic_totals.clone(),
            source_totals: self.source_totals.clone(),
        };
        save_pair(dir, &metadata, DISAGG_GRID_FILE, &record)
    }

    fn load(dir: &Path) -> Result<Self, StoreError> {
        let metadata: GridMetadata = read_json(&dir.join(METADATA_FILE))?;
        let record: GridRecord = read_json(&dir.join(DISAGG_GRID_FILE))?;

        record.check_shapes()?;

        Ok(Self {
            im: parse_im(&metadata.im, metadata.component)?,
            site: metadata.site,
            exceedance: metadata.exceedance,
            im_level: metadata.im_level,
            mag_edges: record.mag_edges,
            dist_edges: record.dist_edges,
            epsilon_edges: record.epsilon_edges,
            mag_dist: record.mag_dist,
            tectonic: record.tectonic,
            source: record.source,
            epsilon: record.epsilon,
            tectonic_totals: record.tectonic_totals,
            source_totals: record.source_totals,
        })
    }
}

// ---------------------------------------------------------------------------
// UhsResult
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct UhsMetadata {
    component: ImComponent,
    site: SiteInfo,
    exceedance: f64,
}

impl Persist for UhsResult {
    fn save(&self, dir: &Path) -> Result<(), StoreError> {
        let metadata = UhsMetadata {
            component: self.component,
            site: self.site.clone(),
            exceedance: self.exceedance,
        };
        save_pair(dir, &metadata, UHS_FILE, &self.points)
    }

    fn load(dir: &Path) -> Result<Self, StoreError> {
        let metadata: UhsMetadata = read_json(&dir.join(METADATA_FILE))?;
        let points: Vec<UhsPoint> = read_json(&dir.join(UHS_FILE))?;
        Ok(Self {
            site: metadata.site,
            component: metadata.component,
            exceedance: metadata.exceedance,
            points,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn site() -> SiteInfo {
        SiteInfo::new("CCCC", -43.53, 172.63, 250.0).unwrap()
    }

    fn hazard() -> EnsembleHazardResult {
        EnsembleHazardResult {
            im: Im::psa(0.5).unwrap(),
            site: site(),
            im_levels: vec![0.01, 0.1, 1.0],
            mean: vec![0.05, 0.005, 1e-5],
            fault_mean: vec![0.01, 0.002, 1e-5],
            ds_mean: vec![0.04, 0.003, 0.0],
            percentiles: Some(vec![
                PercentileCurve {
                    label: "16th".into(),
                    percentile: 16.0,
                    rates: vec![0.04, 0.004, 5e-6],
                },
                PercentileCurve {
                    label: "84th".into(),
                    percentile: 84.0,
                    rates: vec![0.06, 0.006, 2e-5],
                },
            ]),
        }
    }

    // -- hazard --

    #[test]
    fn hazard_files_written() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("hazard_pSA_0p5");
        hazard().save(&dir).unwrap();

        assert!(is_saved(&dir));
        let metadata: serde_json::Value =
            serde_json::from_reader(File::open(dir.join(METADATA_FILE)).unwrap()).unwrap();
        assert_eq!(metadata["im"], "pSA_0.5");
        assert_eq!(metadata["component"], "RotD50");
        assert_eq!(metadata["site"]["name"], "CCCC");

        let rows: serde_json::Value =
            serde_json::from_reader(File::open(dir.join(HAZARD_STATS_FILE)).unwrap()).unwrap();
        assert_eq!(rows[1]["im_level"], 0.1);
        assert_eq!(rows[1]["percentiles"]["84th"], 0.006);
    }

    #[test]
    fn hazard_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let original = hazard();
        original.save(tmp.path()).unwrap();
        let loaded = EnsembleHazardResult::load(tmp.path()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = EnsembleHazardResult::load(&tmp.path().join("absent")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn corrupt_stats_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        hazard().save(tmp.path()).unwrap();
        fs::write(tmp.path().join(HAZARD_STATS_FILE), "[{\"im_level\": 1.0}").unwrap();
        assert_matches!(
            EnsembleHazardResult::load(tmp.path()),
            Err(StoreError::Json { .. })
        );
    }

    // -- uhs --

    #[test]
    fn uhs_keeps_absent_values() {
        let tmp = tempfile::tempdir().unwrap();
        let uhs = UhsResult {
            site: site(),
            component: ImComponent::RotD50,
            exceedance: 1e-3,
            points: vec![
                UhsPoint {
                    period: 0.0,
                    value: Some(0.4),
                },
                UhsPoint {
                    period: 5.0,
                    value: None,
                },
            ],
        };
        uhs.save(tmp.path()).unwrap();
        assert_eq!(UhsResult::load(tmp.path()).unwrap(), uhs);
    }
}
