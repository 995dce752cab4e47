//! Configuration loading and validation
//!
//! The configuration is a single TOML file. Each entry under `[categories]`
//! names a group of input files: the directory they arrive in and the glob
//! specifications that select them. Two categories are required by the
//! multiplier tool: [`REGIONAL_HAZARD`] and [`MULTIPLIERS`].
//!
//! ```toml
//! [categories.RegionalHazard]
//! origin_dir = "/data/regional"
//! specs = ["*smooth*.tif"]
//!
//! [categories.Multipliers]
//! origin_dir = "/data/multipliers"
//! specs = ["*.tif"]
//!
//! [output]
//! path = "/data/output"
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Category holding the regional hazard rasters
pub const REGIONAL_HAZARD: &str = "RegionalHazard";

/// Category holding the site exposure multiplier tiles
pub const MULTIPLIERS: &str = "Multipliers";

/// Database filename used when `processing.state_db` is not configured
pub const DEFAULT_STATE_DB: &str = "processed_files.db";

/// Provenance filename used when `output.provenance_file` is not configured
pub const DEFAULT_PROVENANCE_FILE: &str = "applymultipliers.json";

/// Complete tool configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Fallback locations
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Input file categories keyed by category name
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryConfig>,

    /// Output location and naming
    #[serde(default)]
    pub output: OutputConfig,

    /// What happens to a source file once it is completely processed
    #[serde(default)]
    pub files: FilesConfig,

    /// State tracking and concurrency
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path the configuration was loaded from (not part of the file)
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// Fallback locations used when a section omits its own
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsConfig {
    /// Origin directory for categories without their own `origin_dir`
    #[serde(default)]
    pub origin_dir: Option<PathBuf>,

    /// Output directory used when `output.path` is not set
    #[serde(default)]
    pub unknown_dir: Option<PathBuf>,
}

/// One input category
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryConfig {
    /// Directory the glob specifications are evaluated against
    #[serde(default)]
    pub origin_dir: Option<PathBuf>,

    /// Glob specifications, e.g. `*.tif` or `wind_*_smooth.tif`
    #[serde(default)]
    pub specs: Vec<String>,
}

/// Output location and naming
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root of the output tree
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Substring of the source basename replaced when naming its mosaic
    #[serde(default = "default_mosaic_match")]
    pub mosaic_match: String,

    /// Replacement for `mosaic_match`
    #[serde(default = "default_mosaic_replace")]
    pub mosaic_replace: String,

    /// Provenance document filename, written inside the output root
    #[serde(default = "default_provenance_file")]
    pub provenance_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            mosaic_match: default_mosaic_match(),
            mosaic_replace: default_mosaic_replace(),
            provenance_file: default_provenance_file(),
        }
    }
}

/// Post-processing policy for source files
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesConfig {
    /// Delete the source file after successful processing
    #[serde(default)]
    pub delete_when_processed: bool,

    /// Move the source file to `archive_dir` after successful processing.
    /// Takes precedence over `delete_when_processed`.
    #[serde(default)]
    pub archive_when_processed: bool,

    /// Archive location (default: `<origin_dir>/processed`)
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    /// Insert the source modification time into the archived filename
    #[serde(default)]
    pub archive_timestamp: bool,
}

/// State tracking and concurrency
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessingConfig {
    /// SQLite database holding processed-file fingerprints
    #[serde(default)]
    pub state_db: Option<PathBuf>,

    /// Number of source files processed concurrently
    #[serde(default)]
    pub workers: Option<usize>,

    /// Number of multiplier tiles combined concurrently for one source file
    #[serde(default)]
    pub tile_concurrency: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Also log to stderr when a log file is configured
    #[serde(default)]
    pub verbose: bool,

    /// Append the run timestamp to the log filename
    #[serde(default)]
    pub datestamp: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            verbose: false,
            datestamp: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mosaic_match() -> String {
    "smooth".to_string()
}

fn default_mosaic_replace() -> String {
    "local".to_string()
}

fn default_provenance_file() -> String {
    DEFAULT_PROVENANCE_FILE.to_string()
}

impl TomlConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Make every relative path in the configuration relative to `base`
    ///
    /// Paths in a configuration file are relative to the file's directory,
    /// not to the directory the tool is started from.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |path: &mut Option<PathBuf>| {
            if let Some(p) = path.as_mut() {
                if p.is_relative() {
                    *p = base.join(&*p);
                }
            }
        };

        resolve(&mut self.defaults.origin_dir);
        resolve(&mut self.defaults.unknown_dir);
        for category in self.categories.values_mut() {
            resolve(&mut category.origin_dir);
        }
        resolve(&mut self.output.path);
        resolve(&mut self.files.archive_dir);
        resolve(&mut self.processing.state_db);
        resolve(&mut self.logging.file);
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that everything a run needs is present
    pub fn validate(&self) -> Result<()> {
        for required in [REGIONAL_HAZARD, MULTIPLIERS] {
            if !self.categories.contains_key(required) {
                return Err(Error::Config(format!(
                    "Missing required category [categories.{}]",
                    required
                )));
            }
        }

        for (name, category) in &self.categories {
            if self.origin_dir(name).is_none() {
                return Err(Error::Config(format!(
                    "Category {} has no origin_dir and no [defaults] origin_dir is set",
                    name
                )));
            }
            if category.specs.iter().all(|s| s.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "Category {} has no file specifications",
                    name
                )));
            }
        }

        if self.output_path().is_none() {
            return Err(Error::Config(
                "No output path: set [output] path or [defaults] unknown_dir".to_string(),
            ));
        }

        if self.processing.workers == Some(0) || self.processing.tile_concurrency == Some(0) {
            return Err(Error::Config(
                "processing.workers and processing.tile_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Origin directory for a category, falling back to `[defaults]`
    pub fn origin_dir(&self, category: &str) -> Option<PathBuf> {
        self.categories
            .get(category)
            .and_then(|c| c.origin_dir.clone())
            .or_else(|| self.defaults.origin_dir.clone())
    }

    /// Output root, falling back to `defaults.unknown_dir`
    pub fn output_path(&self) -> Option<PathBuf> {
        self.output
            .path
            .clone()
            .or_else(|| self.defaults.unknown_dir.clone())
    }

    /// Location of the processed-files database
    pub fn state_db_path(&self) -> Option<PathBuf> {
        self.processing
            .state_db
            .clone()
            .or_else(|| self.output_path().map(|p| p.join(DEFAULT_STATE_DB)))
    }

    /// Number of concurrent source-file workers
    pub fn worker_count(&self) -> usize {
        self.processing.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Number of concurrent multiplier combinations per source file
    pub fn tile_concurrency(&self) -> usize {
        self.processing.tile_concurrency.unwrap_or(1)
    }
}
