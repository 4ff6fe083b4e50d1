//! `hazard-worker` -- batch PSHA runner.
//!
//! Loads a project file, computes ensemble hazard, disaggregation and
//! uniform hazard spectra for every station, and writes each result into
//! its own directory under `OUTPUT_DIR`. Existing result directories are
//! skipped, so an interrupted run can be resumed. See
//! [`hazard_worker::config::WorkerConfig::from_env`] for the environment
//! variables.

use std::sync::Arc;

use hazard_core::ensemble::EnsembleHazardResult;
use hazard_store::cache::InMemoryCache;
use hazard_worker::batch::{run_batch, BatchSettings};
use hazard_worker::config::WorkerConfig;
use hazard_worker::project::Project;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env();
    let json_logs = config.as_ref().is_ok_and(|c| c.json_logs);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hazard_worker=info,hazard_store=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config = config.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let project = Project::load(&config.project_file).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to load project");
        std::process::exit(1);
    });

    tracing::info!(
        project_file = %config.project_file.display(),
        n_sites = project.sites.len(),
        n_ims = project.ims.len(),
        data_type = %project.data_type,
        "Starting hazard-worker",
    );

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing running units");
            ctrl_c_cancel.cancel();
        }
    });

    let cache: Arc<InMemoryCache<EnsembleHazardResult>> = Arc::new(InMemoryCache::new());
    let summary = run_batch(project, BatchSettings::from(&config), cache, cancel).await;

    if !summary.is_success() {
        std::process::exit(1);
    }
}
