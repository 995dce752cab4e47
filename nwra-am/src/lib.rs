//! nwra-am: apply local site exposure multipliers to regional wind hazard
//!
//! Discovers regional hazard rasters and multiplier tiles by category,
//! combines every unprocessed regional raster with every multiplier tile,
//! mosaics the results per regional raster and records what was done.
//!
//! [`run`] is the whole batch; the binary only adds argument parsing,
//! logging and Ctrl-C handling around it.

pub mod dispatcher;
pub mod error;
pub mod models;
pub mod raster;
pub mod services;

pub use crate::error::{PipelineError, PipelineResult};

use crate::dispatcher::{Dispatcher, DispatcherSettings};
use crate::models::{FileState, RunReport};
use crate::services::file_catalog::{Catalog, FileCatalog};
use crate::services::fingerprint_store::FingerprintStore;
use crate::services::provenance::{self, ProvenanceRecorder, SoftwareInfo};
use nwra_common::config::TomlConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run one complete batch
///
/// Fails only on configuration problems: missing or unreadable category
/// directories, an output directory that cannot be created, or a state
/// database that cannot be opened. Everything else is logged and reflected
/// in the returned report.
pub async fn run(config: &TomlConfig, cancel: CancellationToken) -> PipelineResult<RunReport> {
    let started_at = nwra_common::time::now();
    let settings = DispatcherSettings::from_config(config)?;

    std::fs::create_dir_all(&settings.output_root).map_err(|e| {
        PipelineError::Configuration(format!(
            "Cannot create output directory {}: {}",
            settings.output_root.display(),
            e
        ))
    })?;
    info!(output = %settings.output_root.display(), "Output directory");
    tracing::debug!(post_action = ?settings.post_action, "Post-action policy");

    let state_db = config.state_db_path().ok_or_else(|| {
        PipelineError::Configuration("No location for the processing state database".to_string())
    })?;
    let store = FingerprintStore::open(&state_db).await.map_err(|e| {
        PipelineError::Configuration(format!(
            "Cannot open state database {}: {}",
            state_db.display(),
            e
        ))
    })?;

    let discovery_config = config.clone();
    let catalog = tokio::task::spawn_blocking(move || FileCatalog::new().discover_all(&discovery_config))
        .await
        .map_err(|e| PipelineError::Configuration(format!("File discovery failed: {}", e)))??;

    let mut recorder = ProvenanceRecorder::new(SoftwareInfo::from_build(), &provenance::current_user());
    if let Some(path) = &config.source_path {
        recorder.record_config(path);
    }
    recorder.record_catalog(&catalog);

    let dispatcher = Dispatcher::new(settings.clone(), store.clone());
    let mut report = dispatcher.run(&catalog, &cancel).await;
    report.started_at = started_at;

    recorder.record_outputs(&report);
    let document = recorder.finish(report.started_at, report.ended_at);
    let provenance_path = settings.output_root.join(&config.output.provenance_file);
    if let Err(e) = provenance::write_document(&document, &provenance_path) {
        warn!(path = %provenance_path.display(), error = %e, "Cannot write provenance");
    }

    log_summary(&catalog, &report);
    info!("{}", dispatcher.statistics().display_string());
    store.close().await;

    Ok(report)
}

/// Per-category and per-state counts at the end of a run
pub fn log_summary(catalog: &Catalog, report: &RunReport) {
    for category in catalog.categories() {
        info!(
            category = %category.category,
            files = category.files.len(),
            "Processed {} {} files",
            category.files.len(),
            category.category
        );
    }
    info!(
        completed = report.count(FileState::Completed),
        partially_failed = report.count(FileState::PartiallyFailed),
        skipped = report.count(FileState::Skipped),
        not_started = report.not_started.len(),
        generated = report.generated_files().len(),
        "Completed"
    );
}
