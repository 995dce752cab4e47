//! End-to-end batch runs over synthetic rasters

mod helpers;

use helpers::{write_constant_raster, write_corrupt_raster, RasterSpec, TestWorkspace};
use nwra_am::models::FileState;
use nwra_am::raster::read_raster;
use nwra_am::services::FingerprintStore;
use nwra_am::PipelineError;
use std::path::Path;
use tokio_util::sync::CancellationToken;

const REGIONAL: &str = "wind_smooth_100yr.tif";

fn assert_all_close(path: &Path, expected: f32) {
    let raster = read_raster(path).unwrap();
    assert!(
        raster.data.iter().all(|v| (v - expected).abs() < 1e-4),
        "{} not uniformly {}",
        path.display(),
        expected
    );
}

/// One regional raster (2.0) and two tiles (3.0 and -1)
fn scenario(ws: &TestWorkspace) {
    write_constant_raster(&ws.regional(REGIONAL), &RasterSpec::regional(), 2.0);
    write_constant_raster(&ws.multiplier("tile_a.tif"), &RasterSpec::tile(2000.0, 2000.0), 3.0);
    write_constant_raster(&ws.multiplier("tile_b.tif"), &RasterSpec::tile(4000.0, 4000.0), -1.0);
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let ws = TestWorkspace::new();
    scenario(&ws);
    let config = ws.config("");

    let report = nwra_am::run(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.state, FileState::Completed);
    assert_eq!(outcome.combinations.len(), 2);
    let steps: Vec<FileState> = outcome.transitions.iter().map(|t| t.new_state).collect();
    assert_eq!(steps, vec![FileState::Processing, FileState::Completed]);

    let out_dir = ws.output_dir.join("wind_smooth_100yr");
    let tile_a = out_dir.join("tile_a.tif");
    let tile_b = out_dir.join("tile_b.tif");
    assert_all_close(&tile_a, 6.0);
    assert_all_close(&tile_b, 2.0);

    // Output grid is the multiplier's grid
    let out = read_raster(&tile_a).unwrap();
    assert_eq!(out.header.transform, RasterSpec::tile(2000.0, 2000.0).header().transform);
    assert_eq!(out.header.projection.epsg(), Some(28355));
    assert_eq!(out.header.nodata, Some(-9999.0));

    let mosaic = out_dir.join("wind_local_100yr.vrt");
    assert_eq!(outcome.mosaic.as_deref(), Some(mosaic.as_path()));
    let xml = std::fs::read_to_string(&mosaic).unwrap();
    assert!(xml.contains(">tile_a.tif<"));
    assert!(xml.contains(">tile_b.tif<"));

    // Fingerprint recorded, source retained
    let store = FingerprintStore::open(&ws.state_db()).await.unwrap();
    let stored = store
        .load(&ws.regional_dir.to_string_lossy(), REGIONAL)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Some(stored.md5sum), outcome.md5sum);
    assert!(ws.regional(REGIONAL).exists());

    // Provenance lists both outputs and the mosaic
    let provenance: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(ws.output_dir.join("applymultipliers.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(provenance["wasGeneratedBy"].as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let ws = TestWorkspace::new();
    scenario(&ws);
    let config = ws.config("");

    let first = nwra_am::run(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(first.count(FileState::Completed), 1);

    let out_dir = ws.output_dir.join("wind_smooth_100yr");
    let files_before = TestWorkspace::list(&out_dir);
    let modified_before: Vec<_> = files_before
        .iter()
        .map(|p| std::fs::metadata(p).unwrap().modified().unwrap())
        .collect();
    let store = FingerprintStore::open(&ws.state_db()).await.unwrap();
    let fingerprints_before = store.load_all().await.unwrap();
    store.close().await;

    let second = nwra_am::run(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(second.count(FileState::Skipped), 1);
    assert_eq!(second.outcomes[0].transitions.len(), 1);
    assert!(second.generated_files().is_empty());
    assert_eq!(TestWorkspace::list(&out_dir), files_before);
    let modified_after: Vec<_> = files_before
        .iter()
        .map(|p| std::fs::metadata(p).unwrap().modified().unwrap())
        .collect();
    assert_eq!(modified_after, modified_before);

    let store = FingerprintStore::open(&ws.state_db()).await.unwrap();
    assert_eq!(store.load_all().await.unwrap(), fingerprints_before);
}

#[tokio::test]
async fn test_changed_source_is_reprocessed() {
    let ws = TestWorkspace::new();
    scenario(&ws);
    let config = ws.config("");

    nwra_am::run(&config, CancellationToken::new()).await.unwrap();

    // New content under the same name
    write_constant_raster(&ws.regional(REGIONAL), &RasterSpec::regional(), 4.0);
    let report = nwra_am::run(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(report.count(FileState::Completed), 1);
    let out_dir = ws.output_dir.join("wind_smooth_100yr");
    assert_all_close(&out_dir.join("tile_a.tif"), 12.0);
    assert_all_close(&out_dir.join("tile_b.tif"), 4.0);
}

#[tokio::test]
async fn test_one_bad_tile_isolated_and_not_fingerprinted() {
    let ws = TestWorkspace::new();
    write_constant_raster(&ws.regional(REGIONAL), &RasterSpec::regional(), 2.0);
    write_constant_raster(&ws.multiplier("tile_a.tif"), &RasterSpec::tile(0.0, 0.0), 1.5);
    write_corrupt_raster(&ws.multiplier("tile_b.tif"));
    write_constant_raster(&ws.multiplier("tile_c.tif"), &RasterSpec::tile(5000.0, 5000.0), 2.0);
    let config = ws.config("delete_when_processed = true");

    let report = nwra_am::run(&config, CancellationToken::new()).await.unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.state, FileState::PartiallyFailed);
    assert_eq!(outcome.failed_combinations(), 1);
    assert_eq!(outcome.successful_outputs().len(), 2);

    let out_dir = ws.output_dir.join("wind_smooth_100yr");
    assert!(!out_dir.join("tile_b.tif").exists());
    assert_all_close(&out_dir.join("tile_a.tif"), 3.0);
    assert_all_close(&out_dir.join("tile_c.tif"), 4.0);

    // Mosaic references exactly the two good outputs
    let xml = std::fs::read_to_string(out_dir.join("wind_local_100yr.vrt")).unwrap();
    assert!(xml.contains(">tile_a.tif<"));
    assert!(xml.contains(">tile_c.tif<"));
    assert!(!xml.contains("tile_b.tif"));
    assert_eq!(xml.matches("<ComplexSource").count(), 2);

    // Not fingerprinted, not deleted, retried next run
    let store = FingerprintStore::open(&ws.state_db()).await.unwrap();
    assert!(store
        .load(&ws.regional_dir.to_string_lossy(), REGIONAL)
        .await
        .unwrap()
        .is_none());
    store.close().await;
    assert!(ws.regional(REGIONAL).exists());

    let retry = nwra_am::run(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(retry.outcomes[0].state, FileState::PartiallyFailed);
}

#[tokio::test]
async fn test_mosaic_failure_leaves_file_unprocessed() {
    let ws = TestWorkspace::new();
    scenario(&ws);
    let config = ws.config("delete_when_processed = true");

    // A directory where the mosaic should go makes the mosaic write fail
    let out_dir = ws.output_dir.join("wind_smooth_100yr");
    std::fs::create_dir_all(out_dir.join("wind_local_100yr.vrt")).unwrap();

    let report = nwra_am::run(&config, CancellationToken::new()).await.unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.state, FileState::PartiallyFailed);
    assert_eq!(outcome.failed_combinations(), 0);
    assert!(outcome.mosaic.is_none());
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains("Mosaic build failure"));

    // Outputs exist, but the source is neither fingerprinted nor deleted
    assert_all_close(&out_dir.join("tile_a.tif"), 6.0);
    assert!(ws.regional(REGIONAL).exists());
    let store = FingerprintStore::open(&ws.state_db()).await.unwrap();
    assert!(store
        .load(&ws.regional_dir.to_string_lossy(), REGIONAL)
        .await
        .unwrap()
        .is_none());
    store.close().await;

    // Cleared obstruction: the next run completes it
    std::fs::remove_dir(out_dir.join("wind_local_100yr.vrt")).unwrap();
    let retry = nwra_am::run(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(retry.outcomes[0].state, FileState::Completed);
    assert!(out_dir.join("wind_local_100yr.vrt").is_file());
    assert!(!ws.regional(REGIONAL).exists());
}

#[tokio::test]
async fn test_archive_after_completion() {
    let ws = TestWorkspace::new();
    scenario(&ws);
    let config = ws.config(&format!(
        "archive_when_processed = true\ndelete_when_processed = true\narchive_dir = \"{}\"",
        ws.archive_dir.display()
    ));

    let report = nwra_am::run(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(report.count(FileState::Completed), 1);
    assert!(!ws.regional(REGIONAL).exists());
    assert!(ws.archive_dir.join(REGIONAL).exists());
}

#[tokio::test]
async fn test_delete_after_completion() {
    let ws = TestWorkspace::new();
    scenario(&ws);
    let config = ws.config("delete_when_processed = true");

    nwra_am::run(&config, CancellationToken::new()).await.unwrap();

    assert!(!ws.regional(REGIONAL).exists());
    assert!(ws.multiplier("tile_a.tif").exists());
}

#[tokio::test]
async fn test_files_not_matching_spec_are_ignored() {
    let ws = TestWorkspace::new();
    scenario(&ws);
    write_constant_raster(&ws.regional("wind_raw_100yr.tif"), &RasterSpec::regional(), 9.0);
    std::fs::write(ws.regional("empty_smooth.tif"), b"").unwrap();
    let config = ws.config("");

    let report = nwra_am::run(&config, CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert!(!ws.output_dir.join("wind_raw_100yr").exists());
    assert!(!ws.output_dir.join("empty_smooth").exists());
}

#[tokio::test]
async fn test_cancelled_run_starts_nothing() {
    let ws = TestWorkspace::new();
    scenario(&ws);
    let config = ws.config("");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = nwra_am::run(&config, cancel).await.unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(report.not_started, vec![ws.regional(REGIONAL)]);
    assert!(!ws.output_dir.join("wind_smooth_100yr").exists());

    // Still pending for the next run
    let report = nwra_am::run(&config, CancellationToken::new()).await.unwrap();
    assert_eq!(report.count(FileState::Completed), 1);
}

#[tokio::test]
async fn test_missing_origin_dir_is_fatal() {
    let ws = TestWorkspace::new();
    scenario(&ws);
    let config = ws.config("");
    std::fs::remove_dir_all(&ws.multiplier_dir).unwrap();

    let result = nwra_am::run(&config, CancellationToken::new()).await;
    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}
