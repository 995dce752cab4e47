//! Batch dispatcher
//!
//! Drives every regional hazard file through
//! `Discovered → Skipped | Processing → Completed | PartiallyFailed`.
//!
//! Each regional file is one unit of work: hash, skip check, one combination
//! per multiplier tile, mosaic, then fingerprint and post-action. Units run
//! concurrently up to the worker count; cancellation stops new units from
//! starting and lets running ones finish.

pub mod statistics;

pub use statistics::{RunStatistics, StatisticsSnapshot};

use crate::error::{CombineError, PipelineError, PipelineResult};
use crate::models::{CombinationResult, FileOutcome, FileRecord, FileState, RunReport};
use crate::raster::{mosaic_name, MosaicAssembler, Raster, RasterCombiner};
use crate::services::fingerprint_store::{file_stat, FileStat, FingerprintStore};
use crate::services::file_catalog::Catalog;
use crate::services::post_action::PostAction;
use futures::stream::{self, StreamExt};
use nwra_common::config::{TomlConfig, MULTIPLIERS, REGIONAL_HAZARD};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Settings the dispatcher needs from the configuration
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Output root; each regional file gets `<output_root>/<stem>/`
    pub output_root: PathBuf,
    pub mosaic_match: String,
    pub mosaic_replace: String,
    /// Concurrent regional files
    pub workers: usize,
    /// Concurrent multiplier combinations within one regional file
    pub tile_concurrency: usize,
    pub post_action: PostAction,
}

impl DispatcherSettings {
    pub fn from_config(config: &TomlConfig) -> PipelineResult<Self> {
        let output_root = config
            .output_path()
            .ok_or_else(|| PipelineError::Configuration("No output path configured".to_string()))?;
        Ok(Self {
            output_root,
            mosaic_match: config.output.mosaic_match.clone(),
            mosaic_replace: config.output.mosaic_replace.clone(),
            workers: config.worker_count().max(1),
            tile_concurrency: config.tile_concurrency().max(1),
            post_action: PostAction::from_config(config),
        })
    }

    /// Output directory for a regional hazard file
    pub fn output_dir_for(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.output_root.join(stem)
    }

    /// Output raster for a (regional file, multiplier tile) pair
    pub fn output_path_for(&self, source: &Path, multiplier: &Path) -> PathBuf {
        let name = multiplier
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        self.output_dir_for(source).join(name)
    }

    /// Mosaic path for a regional hazard file
    pub fn mosaic_path_for(&self, source: &Path) -> PathBuf {
        self.output_dir_for(source)
            .join(mosaic_name(source, &self.mosaic_match, &self.mosaic_replace))
    }
}

/// Batch dispatcher
pub struct Dispatcher {
    settings: Arc<DispatcherSettings>,
    store: FingerprintStore,
    combiner: RasterCombiner,
    assembler: MosaicAssembler,
    stats: Arc<RunStatistics>,
}

impl Dispatcher {
    pub fn new(settings: DispatcherSettings, store: FingerprintStore) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
            combiner: RasterCombiner::new(),
            assembler: MosaicAssembler::new(),
            stats: Arc::new(RunStatistics::new()),
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    /// Process every regional hazard file in `catalog`
    ///
    /// Never fails: per-file problems are recorded in the returned report.
    pub async fn run(&self, catalog: &Catalog, cancel: &CancellationToken) -> RunReport {
        let started_at = nwra_common::time::now();
        let regional = catalog.files(REGIONAL_HAZARD).to_vec();
        let multipliers: Arc<Vec<FileRecord>> = Arc::new(catalog.files(MULTIPLIERS).to_vec());
        let total = regional.len();

        for name in duplicate_basenames(&multipliers) {
            warn!(
                tile = %name,
                "Several multiplier tiles share this filename; their outputs overwrite each other"
            );
        }
        if multipliers.is_empty() {
            warn!("No multiplier tiles found, regional files will produce no outputs");
        }

        info!(
            regional_files = total,
            multiplier_tiles = multipliers.len(),
            workers = self.settings.workers,
            tile_concurrency = self.settings.tile_concurrency,
            "Starting dispatch"
        );

        let results: Vec<(usize, Result<FileOutcome, PathBuf>)> =
            stream::iter(regional.into_iter().enumerate())
                .map(|(index, record)| {
                    let multipliers = multipliers.clone();
                    async move {
                        if cancel.is_cancelled() {
                            debug!(file = %record.path.display(), "Run cancelled, not starting");
                            return (index, Err(record.path));
                        }
                        self.stats.file_started();
                        let outcome = self.process_file(&record, &multipliers).await;
                        let finished = self.stats.file_finished(outcome.state);
                        debug!(
                            progress = %self.stats.snapshot().progress_string(total),
                            "Dispatch progress"
                        );
                        if finished % 10 == 0 || finished == total {
                            info!(progress = %format!("{}/{}", finished, total), "Dispatch progress update");
                        }
                        (index, Ok(outcome))
                    }
                })
                .buffer_unordered(self.settings.workers)
                .collect()
                .await;

        let mut ordered = results;
        ordered.sort_by_key(|(index, _)| *index);

        let mut outcomes = Vec::with_capacity(ordered.len());
        let mut not_started = Vec::new();
        for (_, result) in ordered {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(path) => not_started.push(path),
            }
        }

        if !not_started.is_empty() {
            warn!(
                not_started = not_started.len(),
                "Run cancelled before all regional files were started"
            );
        }

        RunReport {
            started_at,
            ended_at: nwra_common::time::now(),
            outcomes,
            not_started,
        }
    }

    /// Run one regional hazard file through its whole unit of work
    pub async fn process_file(&self, record: &FileRecord, multipliers: &[FileRecord]) -> FileOutcome {
        let source = record.path.clone();
        let mut outcome = FileOutcome::discovered(&source);
        info!(file = %source.display(), "Processing");

        // Discovered: hash and skip check
        let stat = match self.stat(&source).await {
            Ok(stat) => stat,
            Err(e) => {
                error!(file = %source.display(), error = %e, "Cannot fingerprint file");
                outcome.errors.push(e.to_string());
                outcome.transition_to(FileState::PartiallyFailed);
                return outcome;
            }
        };
        outcome.md5sum = Some(stat.md5sum.clone());

        match self
            .store
            .is_processed(&stat.directory, &stat.filename, &stat.md5sum)
            .await
        {
            Ok(true) => {
                info!(file = %source.display(), "Already processed");
                outcome.transition_to(FileState::Skipped);
                return outcome;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    file = %source.display(),
                    error = %e,
                    "Fingerprint lookup failed, processing anyway"
                );
            }
        }

        // Processing: every multiplier, failures isolated per pair
        outcome.transition_to(FileState::Processing);
        outcome.combinations = self.combine_all(&source, multipliers).await;

        let outputs = outcome.successful_outputs();
        let mut mosaic_failed = false;
        if multipliers.is_empty() {
            warn!(file = %source.display(), "No multiplier tiles, mosaic not created");
        } else if outputs.is_empty() {
            warn!(
                file = %source.display(),
                "No combination succeeded, mosaic not created"
            );
        } else {
            match self.build_mosaic(&source, outputs).await {
                Ok(Some(mosaic)) => {
                    self.stats.mosaic_built();
                    outcome.mosaic = Some(mosaic);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(file = %source.display(), error = %e, "Cannot create mosaic");
                    outcome.errors.push(e.to_string());
                    mosaic_failed = true;
                }
            }
        }

        let failures = outcome.failed_combinations();
        if failures > 0 || mosaic_failed {
            warn!(
                file = %source.display(),
                failed_combinations = failures,
                mosaic_failed,
                "File partially failed, will be retried next run"
            );
            outcome.transition_to(FileState::PartiallyFailed);
            return outcome;
        }

        // Fingerprint only once every part of the unit has succeeded
        let fingerprint = stat.fingerprint(nwra_common::time::now());
        if let Err(e) = self.store.record(&fingerprint).await {
            error!(file = %source.display(), error = %e, "Cannot record fingerprint");
            outcome.errors.push(PipelineError::from(e).to_string());
            outcome.transition_to(FileState::PartiallyFailed);
            return outcome;
        }
        outcome.transition_to(FileState::Completed);
        info!(
            file = %source.display(),
            outputs = outcome.combinations.len(),
            "Successfully processed"
        );

        self.apply_post_action(&source).await;
        outcome
    }

    async fn stat(&self, path: &Path) -> PipelineResult<FileStat> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || file_stat(&path))
            .await
            .map_err(|e| PipelineError::TransformFailure(format!("hashing task failed: {}", e)))?
            .map_err(PipelineError::from)
    }

    async fn combine_all(&self, source: &Path, multipliers: &[FileRecord]) -> Vec<CombinationResult> {
        if multipliers.is_empty() {
            return Vec::new();
        }

        // The regional raster is decoded once and shared by every pair
        let combiner = self.combiner.clone();
        let base_path = source.to_path_buf();
        let base: Arc<Result<Raster, CombineError>> = Arc::new(
            tokio::task::spawn_blocking(move || combiner.open_base(&base_path))
                .await
                .unwrap_or_else(|e| {
                    Err(CombineError::TransformFailure(format!("decode task failed: {}", e)))
                }),
        );
        if let Err(e) = base.as_ref() {
            error!(file = %source.display(), error = %e, "Cannot open regional raster");
        }

        let results: Vec<CombinationResult> = stream::iter(multipliers.iter())
            .map(|tile| {
                let base = base.clone();
                let combiner = self.combiner.clone();
                let tile_path = tile.path.clone();
                let output = self.settings.output_path_for(source, &tile.path);
                async move {
                    let result = match base.as_ref() {
                        Err(e) => Err(e.clone()),
                        Ok(_) => {
                            let task_base = base.clone();
                            let task_tile = tile_path.clone();
                            tokio::task::spawn_blocking(move || match task_base.as_ref() {
                                Ok(raster) => combiner.combine_with_base(raster, &task_tile, &output),
                                Err(e) => Err(e.clone()),
                            })
                            .await
                            .unwrap_or_else(|e| {
                                Err(CombineError::TransformFailure(format!(
                                    "combination task failed: {}",
                                    e
                                )))
                            })
                        }
                    };
                    match result {
                        Ok(output) => {
                            info!(
                                multiplier = %tile_path.display(),
                                output = %output.display(),
                                "Local wind hazard saved"
                            );
                            CombinationResult::success(tile_path, output)
                        }
                        Err(e) => {
                            error!(multiplier = %tile_path.display(), error = %e, "Combination failed");
                            CombinationResult::failure(tile_path, e)
                        }
                    }
                }
            })
            .buffered(self.settings.tile_concurrency)
            .collect()
            .await;

        for result in &results {
            self.stats.combination(result.is_success());
        }
        results
    }

    async fn build_mosaic(
        &self,
        source: &Path,
        outputs: Vec<PathBuf>,
    ) -> PipelineResult<Option<PathBuf>> {
        let assembler = self.assembler.clone();
        let mosaic_path = self.settings.mosaic_path_for(source);
        tokio::task::spawn_blocking(move || assembler.build(&outputs, &mosaic_path))
            .await
            .map_err(|e| PipelineError::MosaicBuildFailure(format!("mosaic task failed: {}", e)))?
    }

    async fn apply_post_action(&self, source: &Path) {
        let action = self.settings.post_action.clone();
        let path = source.to_path_buf();
        let result = tokio::task::spawn_blocking(move || action.apply(&path)).await;
        match result {
            Ok(Ok(done)) => debug!(file = %source.display(), outcome = ?done, "Post-action applied"),
            Ok(Err(e)) => warn!(file = %source.display(), error = %e, "Post-action failed"),
            Err(e) => warn!(file = %source.display(), error = %e, "Post-action task failed"),
        }
    }
}

/// Multiplier filenames that occur more than once
fn duplicate_basenames(multipliers: &[FileRecord]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in multipliers {
        *counts.entry(record.filename()).or_default() += 1;
    }
    let mut duplicates: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect();
    duplicates.sort();
    duplicates
}
