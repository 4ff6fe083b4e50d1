//! Integration tests for saving computed results into result directories.

use std::sync::Arc;

use assert_matches::assert_matches;
use hazard_core::disagg::{run_ensemble_disagg, DisaggResult, DisaggTarget};
use hazard_core::disagg_grid::{run_disagg_gridding, DisaggGridResult, GridConfig};
use hazard_core::ensemble::{run_ensemble_hazard, AggregateOptions, EnsembleHazardResult};
use hazard_core::exceedance::Branch;
use hazard_core::gm::{ImDataType, RuptureGm};
use hazard_core::im::Im;
use hazard_core::im_levels::logspace;
use hazard_core::rupture::{Rupture, RuptureTable, SourceType, TectonicType};
use hazard_core::site::SiteInfo;
use hazard_core::HazardError;
use hazard_store::naming::{disagg_dir_name, disagg_grid_dir_name, hazard_dir_name};
use hazard_store::persist::is_saved;
use hazard_store::{Persist, StoreError};

fn computed() -> (EnsembleHazardResult, DisaggResult, DisaggGridResult) {
    let ruptures = Arc::new(
        RuptureTable::new(vec![
            Rupture {
                id: "fault".into(),
                name: "fault".into(),
                annual_rate: 0.002,
                magnitude: 7.8,
                tectonic_type: TectonicType::SubductionInterface,
                source_type: SourceType::Fault,
                distance: 60.0,
            },
            Rupture {
                id: "ds".into(),
                name: "ds".into(),
                annual_rate: 0.03,
                magnitude: 5.5,
                tectonic_type: TectonicType::ActiveShallow,
                source_type: SourceType::Distributed,
                distance: 12.0,
            },
        ])
        .unwrap(),
    );
    let branch = Branch::new(
        "only",
        1.0,
        ruptures,
        vec![
            RuptureGm::parametric(0.15, 0.55).unwrap(),
            RuptureGm::parametric(0.08, 0.6).unwrap(),
        ],
    )
    .unwrap();
    let site = SiteInfo::new("WEL", -41.29, 174.78, 400.0).unwrap();

    let hazard = run_ensemble_hazard(
        Im::pga(),
        site,
        std::slice::from_ref(&branch),
        &logspace(0.001, 5.0, 60).unwrap(),
        ImDataType::Parametric,
        &AggregateOptions::default(),
    )
    .unwrap();
    let disagg = run_ensemble_disagg(
        &hazard,
        &[branch],
        DisaggTarget::Exceedance(1.0 / 500.0),
        ImDataType::Parametric,
    )
    .unwrap();
    let grid = run_disagg_gridding(&disagg, &GridConfig::default()).unwrap();
    (hazard, disagg, grid)
}

/// Every result kind is reconstructed exactly from its directory.
#[test]
fn computed_results_reload_from_their_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let (hazard, disagg, grid) = computed();

    let hazard_dir = tmp.path().join(hazard_dir_name(&hazard.im));
    let disagg_dir = tmp.path().join(disagg_dir_name(&disagg.im, 500.0));
    let grid_dir = tmp.path().join(disagg_grid_dir_name(&grid.im, 500.0));

    hazard.save(&hazard_dir).unwrap();
    disagg.save(&disagg_dir).unwrap();
    grid.save(&grid_dir).unwrap();

    assert!(is_saved(&hazard_dir) && is_saved(&disagg_dir) && is_saved(&grid_dir));
    assert_eq!(EnsembleHazardResult::load(&hazard_dir).unwrap(), hazard);
    assert_eq!(DisaggResult::load(&disagg_dir).unwrap(), disagg);
    assert_eq!(DisaggGridResult::load(&grid_dir).unwrap(), grid);
}

/// The grid file keeps the 3-D arrays with their shapes.
#[test]
fn grid_file_holds_shaped_arrays() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, _, grid) = computed();
    grid.save(tmp.path()).unwrap();

    let raw = std::fs::read_to_string(tmp.path().join("disagg_grid.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["tectonic"]["dim"][0], 4);
    assert_eq!(json["source"]["dim"][0], 2);
}

/// A grid whose stacks or totals disagree with its edges is rejected.
#[test]
fn misshapen_grid_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, _, grid) = computed();
    let path = tmp.path().join("disagg_grid.json");

    let corrupt = |edit: &dyn Fn(&mut serde_json::Value)| {
        grid.save(tmp.path()).unwrap();
        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        edit(&mut json);
        std::fs::write(&path, json.to_string()).unwrap();
        DisaggGridResult::load(tmp.path())
    };

    assert_matches!(
        corrupt(&|json: &mut serde_json::Value| {
            let source = json["source"].clone();
            json["tectonic"] = source;
        }),
        Err(StoreError::Hazard(HazardError::DataIntegrity(msg))) if msg.contains("tectonic")
    );
    assert_matches!(
        corrupt(&|json: &mut serde_json::Value| {
            json["source_totals"] = serde_json::json!([1.0]);
        }),
        Err(StoreError::Hazard(HazardError::DataIntegrity(msg))) if msg.contains("source_totals")
    );
    assert!(corrupt(&|_: &mut serde_json::Value| {}).is_ok());
}
