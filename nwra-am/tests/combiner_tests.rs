//! Raster combiner behaviour on real files

mod helpers;

use helpers::{write_constant_raster, write_corrupt_raster, write_raster_values, RasterSpec};
use nwra_am::error::CombineError;
use nwra_am::raster::{read_header, read_raster, RasterCombiner};
use tempfile::TempDir;

#[test]
fn test_negative_multiplier_becomes_identity() {
    let temp_dir = TempDir::new().unwrap();
    let base = write_constant_raster(&temp_dir.path().join("base.tif"), &RasterSpec::regional(), 2.0);
    let spec = RasterSpec::tile(1000.0, 1000.0);
    let mut values = vec![1.5f32; spec.width * spec.height];
    values[0] = -5.0;
    values[7] = -9999.0;
    let tile = write_raster_values(&temp_dir.path().join("tile.tif"), &spec, &values);
    let output = temp_dir.path().join("out").join("tile.tif");

    let written = RasterCombiner::new().combine(&base, &tile, &output).unwrap();
    assert_eq!(written, output);

    let result = read_raster(&output).unwrap();
    assert!((result.data[0] - 2.0).abs() < 1e-5);
    assert!((result.data[7] - 2.0).abs() < 1e-5);
    assert!((result.data[1] - 3.0).abs() < 1e-5);
}

#[test]
fn test_output_grid_matches_multiplier() {
    let temp_dir = TempDir::new().unwrap();
    let base = write_constant_raster(&temp_dir.path().join("base.tif"), &RasterSpec::regional(), 1.0);
    // Odd size and resolution, not aligned with the regional grid
    let spec = RasterSpec {
        origin_x: 503_130.0,
        origin_y: 6_007_870.0,
        pixel_size: 7.0,
        width: 13,
        height: 11,
        epsg: Some(28355),
    };
    let tile = write_constant_raster(&temp_dir.path().join("tile.tif"), &spec, 1.0);
    let output = temp_dir.path().join("out.tif");

    RasterCombiner::new().combine(&base, &tile, &output).unwrap();

    let tile_header = read_header(&tile).unwrap();
    let out_header = read_header(&output).unwrap();
    assert_eq!(out_header.width, tile_header.width);
    assert_eq!(out_header.height, tile_header.height);
    assert_eq!(out_header.transform, tile_header.transform);
    assert_eq!(out_header.projection, tile_header.projection);
}

#[test]
fn test_tile_beyond_regional_extent_is_nodata() {
    let temp_dir = TempDir::new().unwrap();
    let base = write_constant_raster(&temp_dir.path().join("base.tif"), &RasterSpec::regional(), 2.0);
    // Entirely east of the regional grid
    let tile = write_constant_raster(
        &temp_dir.path().join("tile.tif"),
        &RasterSpec::tile(20_000.0, 1000.0),
        3.0,
    );
    let output = temp_dir.path().join("out.tif");

    RasterCombiner::new().combine(&base, &tile, &output).unwrap();
    let result = read_raster(&output).unwrap();
    assert!(result.data.iter().all(|v| *v == -9999.0));
}

#[test]
fn test_unreadable_multiplier_leaves_no_output() {
    let temp_dir = TempDir::new().unwrap();
    let base = write_constant_raster(&temp_dir.path().join("base.tif"), &RasterSpec::regional(), 2.0);
    let tile = write_corrupt_raster(&temp_dir.path().join("tile.tif"));
    let output = temp_dir.path().join("out").join("tile.tif");

    let err = RasterCombiner::new().combine(&base, &tile, &output).unwrap_err();
    match err {
        CombineError::InputUnreadable { path, .. } => assert_eq!(path, tile),
        other => panic!("Expected InputUnreadable, got {:?}", other),
    }
    assert!(!output.exists());
}

#[test]
fn test_unreadable_base_leaves_no_output() {
    let temp_dir = TempDir::new().unwrap();
    let tile = write_constant_raster(
        &temp_dir.path().join("tile.tif"),
        &RasterSpec::tile(0.0, 0.0),
        1.0,
    );
    let missing = temp_dir.path().join("missing.tif");
    let output = temp_dir.path().join("out.tif");

    let err = RasterCombiner::new().combine(&missing, &tile, &output).unwrap_err();
    assert!(matches!(err, CombineError::InputUnreadable { .. }));
    assert!(!output.exists());
}

#[test]
fn test_geographic_regional_raster_is_reprojected() {
    let temp_dir = TempDir::new().unwrap();
    // GDA94 geographic, 146-148E 35-37S
    let regional = RasterSpec {
        origin_x: 146.0,
        origin_y: -35.0,
        pixel_size: 0.2,
        width: 10,
        height: 10,
        epsg: Some(4283),
    };
    let base = write_constant_raster(&temp_dir.path().join("base.tif"), &regional, 2.0);
    // MGA zone 55 tile inside the regional extent
    let tile_spec = RasterSpec::tile(0.0, 0.0);
    let tile = write_constant_raster(&temp_dir.path().join("tile.tif"), &tile_spec, 3.0);
    let output = temp_dir.path().join("out.tif");

    RasterCombiner::new().combine(&base, &tile, &output).unwrap();

    let result = read_raster(&output).unwrap();
    assert_eq!(result.header.transform, tile_spec.header().transform);
    assert_eq!(result.header.projection.epsg(), Some(28355));
    assert!(result.data.iter().all(|v| (v - 6.0).abs() < 1e-4));
}

#[test]
fn test_unknown_projection_is_transform_failure() {
    let temp_dir = TempDir::new().unwrap();
    let base = write_constant_raster(&temp_dir.path().join("base.tif"), &RasterSpec::regional(), 2.0);
    let mut spec = RasterSpec::tile(0.0, 0.0);
    spec.epsg = Some(1);
    let tile = write_constant_raster(&temp_dir.path().join("tile.tif"), &spec, 1.0);
    let output = temp_dir.path().join("out.tif");

    let err = RasterCombiner::new().combine(&base, &tile, &output).unwrap_err();
    assert!(matches!(err, CombineError::TransformFailure(_)));
    assert!(!output.exists());
}

#[test]
fn test_existing_output_is_overwritten() {
    let temp_dir = TempDir::new().unwrap();
    let base = write_constant_raster(&temp_dir.path().join("base.tif"), &RasterSpec::regional(), 2.0);
    let tile = write_constant_raster(
        &temp_dir.path().join("tile.tif"),
        &RasterSpec::tile(0.0, 0.0),
        2.5,
    );
    let output = temp_dir.path().join("out.tif");
    std::fs::write(&output, b"previous run").unwrap();

    RasterCombiner::new().combine(&base, &tile, &output).unwrap();
    let result = read_raster(&output).unwrap();
    assert!(result.data.iter().all(|v| (v - 5.0).abs() < 1e-5));
}
