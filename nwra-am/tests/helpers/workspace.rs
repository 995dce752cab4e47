//! Temporary directory tree and configuration for pipeline tests

use nwra_common::config::TomlConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Input, output and archive directories under one temp root
///
/// Keep the workspace alive for the duration of the test.
pub struct TestWorkspace {
    _dir: TempDir,
    pub root: PathBuf,
    pub regional_dir: PathBuf,
    pub multiplier_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        // Canonical so paths compare equal to catalog output
        let root = dir.path().canonicalize().unwrap();
        let regional_dir = root.join("regional");
        let multiplier_dir = root.join("multipliers");
        std::fs::create_dir_all(&regional_dir).unwrap();
        std::fs::create_dir_all(&multiplier_dir).unwrap();

        Self {
            _dir: dir,
            output_dir: root.join("output"),
            archive_dir: root.join("archive"),
            regional_dir,
            multiplier_dir,
            root,
        }
    }

    pub fn regional(&self, name: &str) -> PathBuf {
        self.regional_dir.join(name)
    }

    pub fn multiplier(&self, name: &str) -> PathBuf {
        self.multiplier_dir.join(name)
    }

    pub fn state_db(&self) -> PathBuf {
        self.output_dir.join("processed_files.db")
    }

    /// Configuration TOML with an extra `[files]` body
    pub fn config_toml(&self, files_section: &str) -> String {
        format!(
            r#"
[categories.RegionalHazard]
origin_dir = "{regional}"
specs = ["*smooth*.tif"]

[categories.Multipliers]
origin_dir = "{multipliers}"
specs = ["*.tif"]

[output]
path = "{output}"

[files]
{files}

[processing]
workers = 2
tile_concurrency = 2
"#,
            regional = self.regional_dir.display(),
            multipliers = self.multiplier_dir.display(),
            output = self.output_dir.display(),
            files = files_section,
        )
    }

    /// Write the configuration file and load it
    pub fn config(&self, files_section: &str) -> TomlConfig {
        let path = self.root.join("applymultipliers.toml");
        std::fs::write(&path, self.config_toml(files_section)).unwrap();
        TomlConfig::load(&path).unwrap()
    }

    /// Regular files directly under `dir`, sorted
    pub fn list(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_file())
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }
}
