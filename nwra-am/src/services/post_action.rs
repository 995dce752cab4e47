//! What happens to a regional hazard file once it has been fully processed
//!
//! Archive takes precedence over delete when both are configured. Neither
//! runs for files that were skipped or only partially processed.

use chrono::{DateTime, Utc};
use nwra_common::config::TomlConfig;
use nwra_common::time::{file_stamp, from_system_time};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Post-processing policy for completed source files
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostAction {
    /// Move the file into `dir` (or `<origin_dir>/processed` when unset)
    Archive {
        dir: Option<PathBuf>,
        /// Insert the file's modification time into the archived name
        timestamp: bool,
    },
    /// Remove the file
    Delete,
    /// Leave the file where it is
    Retain,
}

/// What a post-action did to a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostActionOutcome {
    Archived(PathBuf),
    Deleted,
    Retained,
}

impl PostAction {
    pub fn from_config(config: &TomlConfig) -> Self {
        let files = &config.files;
        if files.archive_when_processed {
            PostAction::Archive {
                dir: files.archive_dir.clone(),
                timestamp: files.archive_timestamp,
            }
        } else if files.delete_when_processed {
            PostAction::Delete
        } else {
            PostAction::Retain
        }
    }

    /// Apply this action to `path`
    pub fn apply(&self, path: &Path) -> io::Result<PostActionOutcome> {
        match self {
            PostAction::Archive { dir, timestamp } => {
                let dir = match dir {
                    Some(dir) => dir.clone(),
                    None => path
                        .parent()
                        .map(|p| p.join("processed"))
                        .ok_or_else(|| {
                            io::Error::new(io::ErrorKind::InvalidInput, "path has no parent")
                        })?,
                };
                let stamp = if *timestamp {
                    let modified = std::fs::metadata(path)?.modified()?;
                    Some(from_system_time(modified))
                } else {
                    None
                };
                let target = archive_target(path, &dir, stamp)?;
                archive_file(path, &target)?;
                info!(
                    file = %path.display(),
                    archive = %target.display(),
                    "Archived source file"
                );
                Ok(PostActionOutcome::Archived(target))
            }
            PostAction::Delete => {
                std::fs::remove_file(path)?;
                info!(file = %path.display(), "Deleted source file");
                Ok(PostActionOutcome::Deleted)
            }
            PostAction::Retain => {
                debug!(file = %path.display(), "Source file retained");
                Ok(PostActionOutcome::Retained)
            }
        }
    }
}

/// Archived location of `path` inside `dir`
///
/// With a stamp, `wind.tif` becomes `wind.202401011200.tif`.
pub fn archive_target(
    path: &Path,
    dir: &Path,
    stamp: Option<DateTime<Utc>>,
) -> io::Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no filename"))?;

    let Some(stamp) = stamp else {
        return Ok(dir.join(file_name));
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, file_stamp(stamp), ext.to_string_lossy()),
        None => format!("{}.{}", stem, file_stamp(stamp)),
    };
    Ok(dir.join(name))
}

/// Move `from` to `to`, copying across filesystems when rename is not possible
fn archive_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(
                from = %from.display(),
                to = %to.display(),
                error = %e,
                "Rename failed, copying instead"
            );
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}
