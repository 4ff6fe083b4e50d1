//! Batch hazard runs over every (station, IM) unit of a project.
//!
//! Units run on Tokio's blocking pool, bounded by a semaphore of
//! `n_workers` permits. Within a unit the order is hazard, then
//! disaggregation and gridding for each return period. A station's UHS
//! runs once all of its units have finished. A unit whose hazard directory
//! holds a complete saved result is skipped; its saved hazard is still
//! loaded for the UHS. A saved hazard that fails to load fails the unit.
//!
//! Cancelling the token stops new units from being dispatched; units that
//! are already running finish normally.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use hazard_core::disagg::{run_ensemble_disagg, DisaggTarget};
use hazard_core::disagg_grid::{run_disagg_gridding, GridConfig};
use hazard_core::ensemble::{run_ensemble_hazard, AggregateOptions, EnsembleHazardResult};
use hazard_core::im::{Im, ImType};
use hazard_core::im_levels::default_im_levels;
use hazard_core::interpolate::rp_to_exceedance;
use hazard_core::uhs::build_uhs;
use hazard_store::cache::{cache_key, ResultCache};
use hazard_store::naming::{disagg_dir_name, disagg_grid_dir_name, hazard_dir_name, uhs_dir_name};
use hazard_store::persist::is_saved;
use hazard_store::Persist;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::project::{Project, SiteProject};

// ---------------------------------------------------------------------------
// Settings & summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub output_dir: PathBuf,
    pub n_workers: usize,
    pub n_im_levels: usize,
    pub aggregate: AggregateOptions,
    pub disagg_return_periods: Vec<f64>,
    pub uhs_return_periods: Vec<f64>,
    pub grid: GridConfig,
}

impl From<&WorkerConfig> for BatchSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            n_workers: config.n_workers,
            n_im_levels: config.n_im_levels,
            aggregate: AggregateOptions {
                calc_percentiles: config.calc_percentiles,
                ..Default::default()
            },
            disagg_return_periods: config.disagg_return_periods.clone(),
            uhs_return_periods: config.uhs_return_periods.clone(),
            grid: GridConfig::default(),
        }
    }
}

/// Counters reported at the end of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub units_completed: usize,
    pub units_skipped: usize,
    pub units_failed: usize,
    /// Units never dispatched because the batch was cancelled.
    pub units_cancelled: usize,
    pub disagg_written: usize,
    /// Return periods outside the hazard range of their unit.
    pub disagg_out_of_range: usize,
    pub uhs_written: usize,
    pub uhs_failed: usize,
}

impl BatchSummary {
    pub fn merge(&mut self, other: &BatchSummary) {
        self.units_completed += other.units_completed;
        self.units_skipped += other.units_skipped;
        self.units_failed += other.units_failed;
        self.units_cancelled += other.units_cancelled;
        self.disagg_written += other.disagg_written;
        self.disagg_out_of_range += other.disagg_out_of_range;
        self.uhs_written += other.uhs_written;
        self.uhs_failed += other.uhs_failed;
    }

    pub fn is_success(&self) -> bool {
        self.units_failed == 0 && self.uhs_failed == 0 && self.units_cancelled == 0
    }
}

/// Outcome of one (station, IM) unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed {
        disagg_written: usize,
        disagg_out_of_range: usize,
    },
    /// Saved hazard already present.
    Skipped,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Shared, read-only state of a running batch.
struct BatchContext {
    project: Project,
    settings: BatchSettings,
    cache: Arc<dyn ResultCache<EnsembleHazardResult>>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl BatchContext {
    fn station_dir(&self, site: &SiteProject) -> PathBuf {
        station_dir(&self.settings.output_dir, &site.site.station_name)
    }

    /// Wait for a worker slot, or `None` once cancelled.
    async fn acquire(&self) -> Option<tokio::sync::OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        }
    }
}

fn hazard_cache_key(station: &str, im: &Im) -> String {
    cache_key(
        "hazard",
        &[
            ("station", station.to_string()),
            ("im", im.to_string()),
            ("component", im.component().to_string()),
        ],
    )
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Run every unit of `project` and each station's UHS.
pub async fn run_batch(
    project: Project,
    settings: BatchSettings,
    cache: Arc<dyn ResultCache<EnsembleHazardResult>>,
    cancel: CancellationToken,
) -> BatchSummary {
    let n_sites = project.sites.len();
    let n_units = project.n_units();
    tracing::info!(
        n_sites,
        n_units,
        n_workers = settings.n_workers,
        output_dir = %settings.output_dir.display(),
        "Batch started",
    );

    let ctx = Arc::new(BatchContext {
        semaphore: Arc::new(Semaphore::new(settings.n_workers.max(1))),
        project,
        settings,
        cache,
        cancel,
    });

    let mut stations = JoinSet::new();
    for site_idx in 0..n_sites {
        stations.spawn(run_station(ctx.clone(), site_idx));
    }

    let mut summary = BatchSummary::default();
    while let Some(joined) = stations.join_next().await {
        match joined {
            Ok(station_summary) => summary.merge(&station_summary),
            Err(e) => {
                tracing::error!(error = %e, "Station task panicked");
                summary.units_failed += 1;
            }
        }
    }

    tracing::info!(
        completed = summary.units_completed,
        skipped = summary.units_skipped,
        failed = summary.units_failed,
        cancelled = summary.units_cancelled,
        disagg_written = summary.disagg_written,
        disagg_out_of_range = summary.disagg_out_of_range,
        uhs_written = summary.uhs_written,
        "Batch finished",
    );
    summary
}

async fn run_station(ctx: Arc<BatchContext>, site_idx: usize) -> BatchSummary {
    let station = ctx.project.sites[site_idx].site.station_name.clone();
    let mut summary = BatchSummary::default();
    let mut units = JoinSet::new();

    for im in ctx.project.ims.iter().copied() {
        let Some(permit) = ctx.acquire().await else {
            summary.units_cancelled += 1;
            continue;
        };
        let unit_ctx = ctx.clone();
        units.spawn_blocking(move || {
            let _permit = permit;
            (im, run_unit(&unit_ctx, site_idx, im))
        });
    }

    while let Some(joined) = units.join_next().await {
        match joined {
            Ok((im, Ok(UnitOutcome::Skipped))) => {
                tracing::info!(station = %station, im = %im, "Unit skipped, output exists");
                summary.units_skipped += 1;
            }
            Ok((
                im,
                Ok(UnitOutcome::Completed {
                    disagg_written,
                    disagg_out_of_range,
                }),
            )) => {
                tracing::info!(
                    station = %station,
                    im = %im,
                    disagg_written,
                    disagg_out_of_range,
                    "Unit completed",
                );
                summary.units_completed += 1;
                summary.disagg_written += disagg_written;
                summary.disagg_out_of_range += disagg_out_of_range;
            }
            Ok((im, Err(e))) => {
                tracing::error!(station = %station, im = %im, error = %e, "Unit failed");
                summary.units_failed += 1;
            }
            Err(e) => {
                tracing::error!(station = %station, error = %e, "Unit panicked");
                summary.units_failed += 1;
            }
        }
    }

    if ctx.settings.uhs_return_periods.is_empty() || ctx.cancel.is_cancelled() {
        return summary;
    }
    let Some(permit) = ctx.acquire().await else {
        return summary;
    };
    let uhs_ctx = ctx.clone();
    let uhs = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        run_station_uhs(&uhs_ctx, site_idx)
    })
    .await;
    match uhs {
        Ok(Ok(written)) => summary.uhs_written += written,
        Ok(Err(e)) => {
            tracing::error!(station = %station, error = %e, "UHS failed");
            summary.uhs_failed += 1;
        }
        Err(e) => {
            tracing::error!(station = %station, error = %e, "UHS task panicked");
            summary.uhs_failed += 1;
        }
    }
    summary
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Hazard, disaggregation and gridding of one (station, IM) unit.
fn run_unit(ctx: &BatchContext, site_idx: usize, im: Im) -> Result<UnitOutcome, WorkerError> {
    let site = &ctx.project.sites[site_idx];
    let station_dir = ctx.station_dir(site);
    let hazard_dir = station_dir.join(hazard_dir_name(&im));
    let key = hazard_cache_key(&site.site.station_name, &im);

    if is_saved(&hazard_dir) {
        let hazard = EnsembleHazardResult::load(&hazard_dir)?;
        ctx.cache.set(key, hazard);
        return Ok(UnitOutcome::Skipped);
    }

    tracing::debug!(station = %site.site.station_name, im = %im, "Unit started");
    let branches = site.branches_for(&im)?;
    let im_levels = default_im_levels(&im, ctx.settings.n_im_levels)?;
    let hazard = run_ensemble_hazard(
        im,
        site.site.clone(),
        &branches,
        &im_levels,
        ctx.project.data_type,
        &ctx.settings.aggregate,
    )?;

    let mut disagg_written = 0;
    let mut disagg_out_of_range = 0;
    for &rp in &ctx.settings.disagg_return_periods {
        let disagg_dir = station_dir.join(disagg_dir_name(&im, rp));
        if is_saved(&disagg_dir) {
            continue;
        }
        let exceedance = rp_to_exceedance(rp);
        let disagg = match run_ensemble_disagg(
            &hazard,
            &branches,
            DisaggTarget::Exceedance(exceedance),
            ctx.project.data_type,
        ) {
            Ok(disagg) => disagg,
            Err(e) if e.is_skippable() => {
                tracing::warn!(
                    station = %site.site.station_name,
                    im = %im,
                    return_period = rp,
                    exceedance,
                    "Exceedance outside the hazard range, skipping disaggregation",
                );
                disagg_out_of_range += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let grid = run_disagg_gridding(&disagg, &ctx.settings.grid)?;
        grid.save(&station_dir.join(disagg_grid_dir_name(&im, rp)))?;
        disagg.save(&disagg_dir)?;
        disagg_written += 1;
    }

    // Saved last so a failed unit is recomputed on the next run.
    hazard.save(&hazard_dir)?;
    ctx.cache.set(key, hazard);

    Ok(UnitOutcome::Completed {
        disagg_written,
        disagg_out_of_range,
    })
}

/// UHS of one station from the cached hazard of its spectral IMs.
///
/// Returns the number of spectra written.
fn run_station_uhs(ctx: &BatchContext, site_idx: usize) -> Result<usize, WorkerError> {
    let site = &ctx.project.sites[site_idx];
    let station = &site.site.station_name;

    let hazards: Vec<EnsembleHazardResult> = ctx
        .project
        .ims
        .iter()
        .filter(|im| matches!(im.im_type(), ImType::Pga | ImType::PSa(_)))
        .filter_map(|im| {
            let hazard = ctx.cache.get(&hazard_cache_key(station, im));
            if hazard.is_none() {
                tracing::warn!(station = %station, im = %im, "No hazard available for UHS");
            }
            hazard
        })
        .collect();
    if hazards.is_empty() {
        tracing::debug!(station = %station, "No spectral hazard, UHS skipped");
        return Ok(0);
    }

    let exceedances: Vec<f64> = ctx
        .settings
        .uhs_return_periods
        .iter()
        .map(|&rp| rp_to_exceedance(rp))
        .collect();
    let spectra = build_uhs(&hazards, &exceedances)?;

    let station_dir = ctx.station_dir(site);
    let mut written = 0;
    for (rp, uhs) in ctx.settings.uhs_return_periods.iter().zip(&spectra) {
        let dir = station_dir.join(uhs_dir_name(*rp));
        if is_saved(&dir) {
            continue;
        }
        uhs.save(&dir)?;
        written += 1;
    }
    tracing::info!(station = %station, written, "UHS saved");
    Ok(written)
}

/// Root directory of a station's results.
pub fn station_dir(output_dir: &Path, station: &str) -> PathBuf {
    output_dir.join(station)
}
