//! Category-based file discovery
//!
//! Expands each configured glob specification against its category's origin
//! directory. Files are deduplicated by canonical path and zero-length files
//! are dropped. Discovery is a two-phase operation: sequential glob expansion
//! followed by parallel metadata checks.

use crate::error::PipelineError;
use crate::models::FileRecord;
use glob::{MatchOptions, Pattern};
use nwra_common::config::TomlConfig;
use nwra_common::time::from_system_time;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Catalog errors. All of them are configuration problems.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Origin directory does not exist
    #[error("Origin directory for category {category} not found: {path}")]
    OriginDirNotFound { category: String, path: PathBuf },

    /// Origin path exists but is not a directory
    #[error("Origin path for category {category} is not a directory: {path}")]
    NotADirectory { category: String, path: PathBuf },

    /// Origin directory cannot be read
    #[error("Cannot read origin directory {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// Glob specification does not parse
    #[error("Invalid file specification '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    /// Category has no origin directory configured
    #[error("Category {0} has no origin directory")]
    NoOriginDir(String),
}

impl From<CatalogError> for PipelineError {
    fn from(err: CatalogError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

/// Files matched by one specification (before cross-spec deduplication)
#[derive(Debug, Clone)]
pub struct SpecExpansion {
    pub spec: String,
    pub files: Vec<PathBuf>,
}

/// Discovery result for one category
#[derive(Debug, Clone)]
pub struct CategoryFiles {
    pub category: String,
    pub origin_dir: PathBuf,
    /// Deduplicated records in discovery order
    pub files: Vec<FileRecord>,
    /// Per-specification matches, kept for provenance
    pub expansions: Vec<SpecExpansion>,
}

/// Discovered files for every configured category
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    categories: BTreeMap<String, CategoryFiles>,
}

impl Catalog {
    pub fn insert(&mut self, files: CategoryFiles) {
        self.categories.insert(files.category.clone(), files);
    }

    /// Records for a category (empty when the category is unknown)
    pub fn files(&self, category: &str) -> &[FileRecord] {
        self.categories
            .get(category)
            .map(|c| c.files.as_slice())
            .unwrap_or(&[])
    }

    pub fn category(&self, category: &str) -> Option<&CategoryFiles> {
        self.categories.get(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryFiles> {
        self.categories.values()
    }
}

/// File catalog service
#[derive(Debug, Clone)]
pub struct FileCatalog {
    match_options: MatchOptions,
}

impl FileCatalog {
    /// Create a catalog that, like shell globbing, does not match hidden
    /// files with wildcards
    pub fn new() -> Self {
        Self {
            match_options: MatchOptions {
                case_sensitive: true,
                require_literal_separator: true,
                require_literal_leading_dot: true,
            },
        }
    }

    /// Discover every category named in the configuration
    pub fn discover_all(&self, config: &TomlConfig) -> Result<Catalog, CatalogError> {
        let mut catalog = Catalog::default();
        for (name, category) in &config.categories {
            let origin_dir = config
                .origin_dir(name)
                .ok_or_else(|| CatalogError::NoOriginDir(name.clone()))?;
            catalog.insert(self.discover(name, &category.specs, &origin_dir)?);
        }
        Ok(catalog)
    }

    /// Expand `specs` against `origin_dir`
    ///
    /// A specification matching nothing is logged and skipped. A missing or
    /// unreadable origin directory is an error.
    pub fn discover(
        &self,
        category: &str,
        specs: &[String],
        origin_dir: &Path,
    ) -> Result<CategoryFiles, CatalogError> {
        if !origin_dir.exists() {
            return Err(CatalogError::OriginDirNotFound {
                category: category.to_string(),
                path: origin_dir.to_path_buf(),
            });
        }
        if !origin_dir.is_dir() {
            return Err(CatalogError::NotADirectory {
                category: category.to_string(),
                path: origin_dir.to_path_buf(),
            });
        }
        let origin_dir = origin_dir
            .canonicalize()
            .map_err(|e| CatalogError::Unreadable {
                path: origin_dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        std::fs::read_dir(&origin_dir).map_err(|e| CatalogError::Unreadable {
            path: origin_dir.clone(),
            reason: e.to_string(),
        })?;

        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let mut expansions = Vec::new();

        for spec in specs.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            // Phase 1: sequential glob expansion
            let candidates = self.expand_spec(&origin_dir, spec)?;

            // Phase 2: parallel stat, dropping empty files and non-files
            let records: Vec<FileRecord> = candidates
                .par_iter()
                .filter_map(|path| stat_record(path, category))
                .collect();

            tracing::info!(
                category,
                spec,
                matched = candidates.len(),
                usable = records.len(),
                "{} {} files to be processed",
                records.len(),
                spec
            );
            if candidates.is_empty() {
                tracing::info!(category, spec, "No files match specification, skipping");
            }

            expansions.push(SpecExpansion {
                spec: spec.to_string(),
                files: records.iter().map(|r| r.path.clone()).collect(),
            });

            for record in records {
                if seen.insert(record.path.clone()) {
                    files.push(record);
                }
            }
        }

        tracing::debug!(
            category,
            origin_dir = %origin_dir.display(),
            files = files.len(),
            "Category discovery complete"
        );

        Ok(CategoryFiles {
            category: category.to_string(),
            origin_dir,
            files,
            expansions,
        })
    }

    fn expand_spec(&self, origin_dir: &Path, spec: &str) -> Result<Vec<PathBuf>, CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidSpec {
            spec: spec.to_string(),
            reason,
        };

        // The directory part is literal; only the specification is a pattern
        Pattern::new(spec).map_err(|e| invalid(e.to_string()))?;
        let escaped_dir = Pattern::escape(&origin_dir.to_string_lossy());
        let pattern = format!("{}/{}", escaped_dir.trim_end_matches('/'), spec);

        let paths = glob::glob_with(&pattern, self.match_options)
            .map_err(|e| invalid(e.to_string()))?;

        let mut matched = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => matched.push(path),
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }
        Ok(matched)
    }
}

impl Default for FileCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a record for a matched path, or `None` if it is not a non-empty file
fn stat_record(path: &Path, category: &str) -> Option<FileRecord> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Cannot stat file, skipping");
            return None;
        }
    };
    if !metadata.is_file() || metadata.len() == 0 {
        return None;
    }

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let modified_at = metadata
        .modified()
        .map(from_system_time)
        .unwrap_or_else(|_| nwra_common::time::now());

    Some(FileRecord {
        path: canonical,
        category: category.to_string(),
        size: metadata.len(),
        modified_at,
    })
}
