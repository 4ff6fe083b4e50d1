//! Integration tests for the batch worker pool.
//!
//! Runs small projects end to end into a temporary output directory and
//! checks the written result directories, skip behaviour and cancellation.

use std::sync::Arc;

use hazard_core::ensemble::{AggregateOptions, EnsembleHazardResult};
use hazard_core::disagg_grid::GridConfig;
use hazard_core::uhs::UhsResult;
use hazard_store::cache::{InMemoryCache, ResultCache};
use hazard_store::Persist;
use hazard_worker::batch::{run_batch, station_dir, BatchSettings, BatchSummary};
use hazard_worker::project::Project;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn ground_motions(scale: f64) -> String {
    format!(
        r#"{{
            "PGA": [
                {{ "parametric": {{ "median": {a}, "sigma": 0.5 }} }},
                {{ "parametric": {{ "median": {b}, "sigma": 0.6 }} }}
            ],
            "pSA_1.0": [
                {{ "parametric": {{ "median": {c}, "sigma": 0.7 }} }},
                {{ "parametric": {{ "median": {d}, "sigma": 0.7 }} }}
            ]
        }}"#,
        a = 0.2 * scale,
        b = 0.05 * scale,
        c = 0.15 * scale,
        d = 0.03 * scale,
    )
}

fn project_json() -> String {
    let ruptures = r#"[
        { "id": "alpine", "name": "alpine", "annual_rate": 0.003, "magnitude": 8.0,
          "tectonic_type": "active_shallow", "source_type": "fault", "distance": 40.0 },
        { "id": "ds", "name": "ds", "annual_rate": 0.04, "magnitude": 5.5,
          "tectonic_type": "active_shallow", "source_type": "distributed", "distance": 10.0 }
    ]"#;
    format!(
        r#"{{
            "ims": ["PGA", "pSA_1.0"],
            "sites": [{{
                "site": {{ "name": "CCCC", "lat": -43.53, "lon": 172.63, "vs30": 250.0 }},
                "branches": [
                    {{ "id": "b1", "weight": 0.6, "ruptures": {ruptures}, "ground_motions": {gm1} }},
                    {{ "id": "b2", "weight": 0.4, "ruptures": {ruptures}, "ground_motions": {gm2} }}
                ]
            }}]
        }}"#,
        gm1 = ground_motions(1.0),
        gm2 = ground_motions(1.3),
    )
}

fn settings(output_dir: &std::path::Path) -> BatchSettings {
    BatchSettings {
        output_dir: output_dir.to_path_buf(),
        n_workers: 2,
        n_im_levels: 100,
        aggregate: AggregateOptions::default(),
        disagg_return_periods: vec![500.0, 1e30],
        uhs_return_periods: vec![100.0, 2500.0],
        grid: GridConfig::default(),
    }
}

async fn run(output_dir: &std::path::Path, cancel: CancellationToken) -> BatchSummary {
    let project = Project::from_json(&project_json()).unwrap();
    let cache: Arc<InMemoryCache<EnsembleHazardResult>> = Arc::new(InMemoryCache::new());
    run_batch(project, settings(output_dir), cache, cancel).await
}

// ---------------------------------------------------------------------------
// Test: full batch
// ---------------------------------------------------------------------------

/// Every unit completes, the extreme return period is counted as out of
/// range, and each result kind lands in its own directory.
#[tokio::test]
async fn batch_writes_all_results() {
    let tmp = tempfile::tempdir().unwrap();
    let summary = run(tmp.path(), CancellationToken::new()).await;

    assert_eq!(summary.units_completed, 2);
    assert_eq!(summary.units_failed, 0);
    assert_eq!(summary.disagg_written, 2);
    assert_eq!(summary.disagg_out_of_range, 2);
    assert_eq!(summary.uhs_written, 2);
    assert!(summary.is_success());

    let station = station_dir(tmp.path(), "CCCC");
    for name in [
        "hazard_PGA",
        "hazard_pSA_1p0",
        "disagg_PGA_500",
        "disagg_grid_pSA_1p0_500",
        "uhs_100",
        "uhs_2500",
    ] {
        assert!(station.join(name).join("metadata.json").is_file(), "{name}");
    }
    let disagg_dirs = std::fs::read_dir(&station)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("disagg_PGA"))
        .count();
    assert_eq!(disagg_dirs, 1);

    let uhs = UhsResult::load(&station.join("uhs_2500")).unwrap();
    assert_eq!(uhs.periods(), vec![0.0, 1.0]);
    assert!(uhs.points.iter().all(|p| p.value.is_some()));
}

/// A second run over the same output directory skips every unit but
/// still fills the cache from disk.
#[tokio::test]
async fn rerun_skips_existing_units() {
    let tmp = tempfile::tempdir().unwrap();
    run(tmp.path(), CancellationToken::new()).await;

    let project = Project::from_json(&project_json()).unwrap();
    let cache: Arc<InMemoryCache<EnsembleHazardResult>> = Arc::new(InMemoryCache::new());
    let summary = run_batch(
        project,
        settings(tmp.path()),
        cache.clone(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(summary.units_skipped, 2);
    assert_eq!(summary.units_completed, 0);
    assert_eq!(summary.uhs_written, 0);
    assert!(cache.get("hazard|station=CCCC|im=PGA|component=RotD50").is_some());

    let saved = EnsembleHazardResult::load(&station_dir(tmp.path(), "CCCC").join("hazard_PGA"))
        .unwrap();
    assert!(saved.percentiles.is_some());
}

/// A hazard directory left without its metadata by an interrupted save
/// is recomputed instead of skipped.
#[tokio::test]
async fn partial_hazard_dir_is_recomputed() {
    let tmp = tempfile::tempdir().unwrap();
    let partial = station_dir(tmp.path(), "CCCC").join("hazard_PGA");
    std::fs::create_dir_all(&partial).unwrap();
    std::fs::write(partial.join("hazard_stats.json"), "[]").unwrap();

    let summary = run(tmp.path(), CancellationToken::new()).await;
    assert_eq!(summary.units_completed, 2);
    assert_eq!(summary.units_skipped, 0);
    assert_eq!(summary.uhs_written, 2);
    assert!(partial.join("metadata.json").is_file());
    assert!(EnsembleHazardResult::load(&partial).is_ok());
}

/// A saved hazard that cannot be read back fails its unit.
#[tokio::test]
async fn corrupt_saved_hazard_fails_unit() {
    let tmp = tempfile::tempdir().unwrap();
    let corrupt = station_dir(tmp.path(), "CCCC").join("hazard_PGA");
    std::fs::create_dir_all(&corrupt).unwrap();
    std::fs::write(corrupt.join("metadata.json"), "not json").unwrap();

    let summary = run(tmp.path(), CancellationToken::new()).await;
    assert_eq!(summary.units_failed, 1);
    assert_eq!(summary.units_completed, 1);
    assert!(!summary.is_success());
}

// ---------------------------------------------------------------------------
// Test: cancellation
// ---------------------------------------------------------------------------

/// A batch cancelled before it starts dispatches nothing.
#[tokio::test]
async fn cancelled_batch_dispatches_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = run(tmp.path(), cancel).await;
    assert_eq!(summary.units_cancelled, 2);
    assert_eq!(summary.units_completed, 0);
    assert!(!summary.is_success());
    assert!(!station_dir(tmp.path(), "CCCC").exists());
}
