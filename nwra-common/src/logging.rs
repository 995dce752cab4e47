//! Logging initialisation
//!
//! Logs go to the configured file when one is set, and to stderr when no
//! file is configured or verbose output is requested. `RUST_LOG` overrides
//! the configured level.

use crate::config::LoggingConfig;
use crate::time::{file_stamp, now};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber
///
/// Returns the path of the log file actually written, if any.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let log_path = config
        .file
        .as_ref()
        .map(|file| log_file_path(file, config.datestamp, now()));

    let file_layer = match &log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let stderr_layer = if log_path.is_none() || verbose || config.verbose {
        Some(fmt::layer().with_writer(std::io::stderr))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialise logging: {}", e)))?;

    Ok(log_path)
}

/// Build the log filename, optionally with a run datestamp before the extension
///
/// `applymultipliers.log` becomes `applymultipliers.202401011200.log`.
pub fn log_file_path(file: &Path, datestamp: bool, at: DateTime<Utc>) -> PathBuf {
    if !datestamp {
        return file.to_path_buf();
    }

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match file.extension() {
        Some(ext) => format!("{}.{}.{}", stem, file_stamp(at), ext.to_string_lossy()),
        None => format!("{}.{}", stem, file_stamp(at)),
    };
    file.with_file_name(name)
}
