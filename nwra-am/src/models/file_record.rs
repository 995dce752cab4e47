//! Discovered input files

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// One discovered input file
///
/// Created during catalog expansion and never modified afterwards. Records
/// live only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Category the file was discovered under
    pub category: String,
    /// Size in bytes (always > 0 for catalogued files)
    pub size: u64,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    /// Base filename including extension
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}
