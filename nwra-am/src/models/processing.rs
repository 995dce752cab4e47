//! Per-file processing state machine
//!
//! Each regional hazard file moves through:
//! DISCOVERED → SKIPPED | PROCESSING → COMPLETED | PARTIALLY_FAILED

use crate::error::CombineError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Processing state of one regional hazard file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    /// Found by the catalog, not yet examined
    Discovered,
    /// Fingerprint matches a previous complete run (terminal, no side effects)
    Skipped,
    /// Combinations in progress
    Processing,
    /// Every combination and the mosaic succeeded
    Completed,
    /// At least one combination, the mosaic, or hashing failed; retried next run
    PartiallyFailed,
}

impl FileState {
    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: FileState) -> bool {
        matches!(
            (self, next),
            (FileState::Discovered, FileState::Skipped)
                | (FileState::Discovered, FileState::Processing)
                | (FileState::Discovered, FileState::PartiallyFailed)
                | (FileState::Processing, FileState::Completed)
                | (FileState::Processing, FileState::PartiallyFailed)
        )
    }

    /// No further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FileState::Skipped | FileState::Completed | FileState::PartiallyFailed
        )
    }
}

/// State transition event
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub path: PathBuf,
    pub old_state: FileState,
    pub new_state: FileState,
    pub transitioned_at: DateTime<Utc>,
}

/// Outcome of one (regional raster, multiplier tile) pair
#[derive(Debug, Clone)]
pub struct CombinationResult {
    /// Multiplier tile used
    pub multiplier: PathBuf,
    /// Output raster, present only on success
    pub output: Option<PathBuf>,
    /// Failure detail, present only on failure
    pub error: Option<CombineError>,
}

impl CombinationResult {
    pub fn success(multiplier: PathBuf, output: PathBuf) -> Self {
        Self {
            multiplier,
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(multiplier: PathBuf, error: CombineError) -> Self {
        Self {
            multiplier,
            output: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.output.is_some()
    }
}

/// Everything that happened to one regional hazard file during a run
#[derive(Debug, Clone)]
pub struct FileOutcome {
    /// Source regional hazard file
    pub path: PathBuf,
    /// Current state
    pub state: FileState,
    /// Content hash, once computed
    pub md5sum: Option<String>,
    /// One entry per multiplier tile attempted
    pub combinations: Vec<CombinationResult>,
    /// Mosaic written for this file, if any
    pub mosaic: Option<PathBuf>,
    /// Failures that are not tied to a single combination
    pub errors: Vec<String>,
    /// Every state change, oldest first
    pub transitions: Vec<StateTransition>,
}

impl FileOutcome {
    /// Start tracking a discovered file
    pub fn discovered(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: FileState::Discovered,
            md5sum: None,
            combinations: Vec::new(),
            mosaic: None,
            errors: Vec::new(),
            transitions: Vec::new(),
        }
    }

    /// Transition to new state and append it to the history
    pub fn transition_to(&mut self, new_state: FileState) {
        debug_assert!(
            self.state.can_transition_to(new_state),
            "illegal transition {:?} -> {:?}",
            self.state,
            new_state
        );
        let transition = StateTransition {
            path: self.path.clone(),
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        tracing::debug!(
            file = %self.path.display(),
            from = ?self.state,
            to = ?new_state,
            "File state transition"
        );
        self.state = new_state;
        self.transitions.push(transition);
    }

    /// Successful output rasters, in multiplier order
    pub fn successful_outputs(&self) -> Vec<PathBuf> {
        self.combinations
            .iter()
            .filter_map(|c| c.output.clone())
            .collect()
    }

    pub fn failed_combinations(&self) -> usize {
        self.combinations.iter().filter(|c| !c.is_success()).count()
    }
}

/// Summary of a whole run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// One entry per regional hazard file examined, in catalog order
    pub outcomes: Vec<FileOutcome>,
    /// Regional hazard files never started because the run was cancelled
    pub not_started: Vec<PathBuf>,
}

impl RunReport {
    /// Number of files that ended in `state`
    pub fn count(&self, state: FileState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// Output rasters and mosaics written during this run
    pub fn generated_files(&self) -> Vec<PathBuf> {
        let mut generated = Vec::new();
        for outcome in &self.outcomes {
            generated.extend(outcome.successful_outputs());
            if let Some(mosaic) = &outcome.mosaic {
                generated.push(mosaic.clone());
            }
        }
        generated
    }
}
