//! Synthetic GeoTIFF fixtures

use nwra_am::raster::{write_raster, GeoTransform, Projection, RasterHeader, NODATA};
use std::path::{Path, PathBuf};

/// Shape and placement of a generated raster
#[derive(Debug, Clone)]
pub struct RasterSpec {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_size: f64,
    pub width: usize,
    pub height: usize,
    pub epsg: Option<u16>,
}

impl Default for RasterSpec {
    fn default() -> Self {
        // 10x10 km regional cell block in MGA zone 55
        Self {
            origin_x: 500_000.0,
            origin_y: 6_010_000.0,
            pixel_size: 1000.0,
            width: 10,
            height: 10,
            epsg: Some(28355),
        }
    }
}

impl RasterSpec {
    /// Regional hazard grid: 10x10 pixels of 1 km
    pub fn regional() -> Self {
        Self::default()
    }

    /// Multiplier tile: 20x20 pixels of 25 m, offset (in metres) from the
    /// regional grid's north-west corner
    pub fn tile(offset_x: f64, offset_y: f64) -> Self {
        Self {
            origin_x: 500_000.0 + offset_x,
            origin_y: 6_010_000.0 - offset_y,
            pixel_size: 25.0,
            width: 20,
            height: 20,
            epsg: Some(28355),
        }
    }

    pub fn header(&self) -> RasterHeader {
        RasterHeader {
            width: self.width,
            height: self.height,
            transform: GeoTransform::north_up(
                self.origin_x,
                self.origin_y,
                self.pixel_size,
                self.pixel_size,
            ),
            projection: self.epsg.map(Projection::from_epsg).unwrap_or_default(),
            nodata: Some(NODATA),
        }
    }
}

/// Write a raster with every pixel set to `value`
pub fn write_constant_raster(path: &Path, spec: &RasterSpec, value: f32) -> PathBuf {
    write_raster_values(path, spec, &vec![value; spec.width * spec.height])
}

/// Write a raster with explicit row-major pixel values
pub fn write_raster_values(path: &Path, spec: &RasterSpec, values: &[f32]) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    write_raster(path, &spec.header(), values).unwrap();
    path.to_path_buf()
}

/// Write a non-empty file that is not a TIFF
pub fn write_corrupt_raster(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"corrupt multiplier tile, not a tiff").unwrap();
    path.to_path_buf()
}
