//! Error types for nwra-am
//!
//! Only [`PipelineError::Configuration`] (and the I/O or database failures
//! raised while setting a run up) ever ends a run. Per-pair and per-file
//! failures are reported as values and logged by the dispatcher.

use std::path::PathBuf;
use thiserror::Error;

/// Run-level error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing required settings or unreadable category directories (fatal)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A raster could not be opened or decoded
    #[error("Input unreadable {path}: {reason}")]
    InputUnreadable { path: PathBuf, reason: String },

    /// Resampling, reprojection or output writing failed
    #[error("Transform failure: {0}")]
    TransformFailure(String),

    /// The virtual mosaic for a source file could not be written
    #[error("Mosaic build failure: {0}")]
    MosaicBuildFailure(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Processing-state database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// nwra-common error
    #[error("Common error: {0}")]
    Common(#[from] nwra_common::Error),
}

/// Failure of a single (regional raster, multiplier tile) combination
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CombineError {
    /// One of the two inputs failed to open; no output was created
    #[error("Input unreadable {path}: {reason}")]
    InputUnreadable { path: PathBuf, reason: String },

    /// Resampling or writing failed; no output was left at the target path
    #[error("Transform failure: {0}")]
    TransformFailure(String),
}

impl From<CombineError> for PipelineError {
    fn from(err: CombineError) -> Self {
        match err {
            CombineError::InputUnreadable { path, reason } => {
                PipelineError::InputUnreadable { path, reason }
            }
            CombineError::TransformFailure(msg) => PipelineError::TransformFailure(msg),
        }
    }
}

/// Result type for run-level operations
pub type PipelineResult<T> = Result<T, PipelineError>;
