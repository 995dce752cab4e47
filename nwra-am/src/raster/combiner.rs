//! Combine a regional hazard raster with a local multiplier tile
//!
//! The regional raster is reprojected and resampled onto the multiplier's
//! exact grid, negative multipliers are replaced by 1.0 and the two are
//! multiplied pixel by pixel. The output carries the multiplier's geotransform
//! and projection.

use super::geotiff::{read_raster, write_raster, RasterError};
use super::reproject::CrsTransform;
use super::resample::{bilinear, bilinear_reprojected, GridSpec};
use super::{Raster, RasterHeader, NODATA};
use crate::error::CombineError;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// Multiplier used where a tile carries no local modification
pub const IDENTITY_MULTIPLIER: f32 = 1.0;

/// Replace invalid (negative) multipliers with the identity
pub fn sanitize_multiplier(value: f32) -> f32 {
    if value < 0.0 {
        IDENTITY_MULTIPLIER
    } else {
        value
    }
}

/// Element-wise product of the resampled base and the sanitised multiplier
///
/// Pixels where the base is no-data, or where the product is not finite,
/// become [`NODATA`].
pub fn apply_multiplier(resampled_base: &[f32], multiplier: &[f32]) -> Vec<f32> {
    resampled_base
        .par_iter()
        .zip(multiplier.par_iter())
        .map(|(&base, &factor)| {
            if base.is_nan() || base == NODATA as f32 {
                return NODATA as f32;
            }
            let product = f64::from(base) * f64::from(sanitize_multiplier(factor));
            if product.is_finite() {
                product as f32
            } else {
                NODATA as f32
            }
        })
        .collect()
}

fn unreadable(path: &Path, err: RasterError) -> CombineError {
    CombineError::InputUnreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Raster combiner
#[derive(Debug, Clone, Default)]
pub struct RasterCombiner;

impl RasterCombiner {
    pub fn new() -> Self {
        Self
    }

    /// Open a regional hazard raster for reuse across several combinations
    pub fn open_base(&self, path: &Path) -> Result<Raster, CombineError> {
        read_raster(path).map_err(|e| unreadable(path, e))
    }

    /// Combine `base_path` with `multiplier_path` into `output`
    ///
    /// On failure no file exists at `output`.
    pub fn combine(
        &self,
        base_path: &Path,
        multiplier_path: &Path,
        output: &Path,
    ) -> Result<PathBuf, CombineError> {
        let base = self.open_base(base_path)?;
        self.combine_with_base(&base, multiplier_path, output)
    }

    /// Combine an already opened regional raster with `multiplier_path`
    pub fn combine_with_base(
        &self,
        base: &Raster,
        multiplier_path: &Path,
        output: &Path,
    ) -> Result<PathBuf, CombineError> {
        let started = Instant::now();
        let multiplier = read_raster(multiplier_path).map_err(|e| unreadable(multiplier_path, e))?;

        let data = combine_rasters(base, &multiplier)?;
        let header = RasterHeader {
            nodata: Some(NODATA),
            ..multiplier.header
        };

        write_raster(output, &header, &data)
            .map_err(|e| CombineError::TransformFailure(e.to_string()))?;

        debug!(
            multiplier = %multiplier_path.display(),
            output = %output.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Combination written"
        );
        Ok(output.to_path_buf())
    }
}

/// Resample `base` onto `multiplier`'s grid and apply the multiplier
///
/// A base in another coordinate system is reprojected on the fly. Only a
/// coordinate system that cannot be built is a transform failure.
pub fn combine_rasters(base: &Raster, multiplier: &Raster) -> Result<Vec<f32>, CombineError> {
    let base_projection = &base.header.projection;
    let multiplier_projection = &multiplier.header.projection;
    let grid = GridSpec {
        width: multiplier.header.width,
        height: multiplier.header.height,
        transform: multiplier.header.transform,
    };

    let resampled = if base_projection.is_compatible(multiplier_projection) {
        bilinear(base, &grid)
    } else {
        let crs = CrsTransform::new(multiplier_projection, base_projection).map_err(|e| {
            CombineError::TransformFailure(format!(
                "cannot reproject from {} to {}: {}",
                base_projection.describe(),
                multiplier_projection.describe(),
                e
            ))
        })?;
        debug!(
            from = %base_projection.describe(),
            to = %multiplier_projection.describe(),
            "Reprojecting regional raster"
        );
        bilinear_reprojected(base, &grid, &crs)
    }
    .ok_or_else(|| {
        CombineError::TransformFailure("regional raster has a degenerate geotransform".to_string())
    })?;

    Ok(apply_multiplier(&resampled, &multiplier.data))
}
