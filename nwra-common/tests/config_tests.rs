//! Tests for configuration file loading

use nwra_common::config::{TomlConfig, MULTIPLIERS, REGIONAL_HAZARD};
use nwra_common::Error;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_full_config_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("applymultipliers.toml");
    std::fs::write(
        &config_path,
        r#"
        [defaults]
        origin_dir = "/data/incoming"
        unknown_dir = "/data/unknown"

        [categories.RegionalHazard]
        origin_dir = "/data/regional"
        specs = ["*smooth*.tif", "extra_*.tif"]

        [categories.Multipliers]
        specs = ["*.tif"]

        [output]
        path = "/data/output"
        mosaic_match = "smoothed"
        mosaic_replace = "localised"

        [files]
        archive_when_processed = true
        delete_when_processed = true
        archive_dir = "/data/archive"
        archive_timestamp = true

        [processing]
        state_db = "/data/state/processed.db"
        workers = 3
        tile_concurrency = 2

        [logging]
        level = "debug"
        file = "/var/log/nwra/am.log"
        verbose = true
        datestamp = true
        "#,
    )
    .unwrap();

    let config = TomlConfig::load(&config_path).unwrap();

    assert_eq!(config.source_path.as_deref(), Some(config_path.as_path()));
    assert_eq!(config.categories[REGIONAL_HAZARD].specs.len(), 2);
    assert_eq!(
        config.origin_dir(MULTIPLIERS),
        Some(PathBuf::from("/data/incoming"))
    );
    assert_eq!(config.output_path(), Some(PathBuf::from("/data/output")));
    assert_eq!(config.output.mosaic_match, "smoothed");
    assert_eq!(config.output.mosaic_replace, "localised");
    assert!(config.files.archive_when_processed);
    assert!(config.files.delete_when_processed);
    assert!(config.files.archive_timestamp);
    assert_eq!(
        config.state_db_path(),
        Some(PathBuf::from("/data/state/processed.db"))
    );
    assert_eq!(config.worker_count(), 3);
    assert_eq!(config.tile_concurrency(), 2);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.verbose);
    assert!(config.logging.datestamp);
}

#[test]
fn test_load_resolves_relative_paths_against_config_dir() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("conf");
    std::fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("applymultipliers.toml");
    std::fs::write(
        &config_path,
        r#"
        [categories.RegionalHazard]
        origin_dir = "regional"
        specs = ["*.tif"]

        [categories.Multipliers]
        origin_dir = "/data/multipliers"
        specs = ["*.tif"]

        [output]
        path = "output"

        [processing]
        state_db = "state/processed.db"
        "#,
    )
    .unwrap();

    let config = TomlConfig::load(&config_path).unwrap();

    assert_eq!(config.origin_dir(REGIONAL_HAZARD), Some(config_dir.join("regional")));
    assert_eq!(
        config.origin_dir(MULTIPLIERS),
        Some(PathBuf::from("/data/multipliers"))
    );
    assert_eq!(config.output_path(), Some(config_dir.join("output")));
    assert_eq!(config.state_db_path(), Some(config_dir.join("state/processed.db")));
}

#[test]
fn test_missing_config_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = TomlConfig::load(&temp_dir.path().join("missing.toml"));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_config_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("bad.toml");
    std::fs::write(&config_path, "[categories.RegionalHazard\nspecs = ").unwrap();

    let result = TomlConfig::load(&config_path);
    assert!(matches!(result, Err(Error::Config(_))));
}
