//! Bilinear resampling onto a target pixel grid

use super::reproject::CrsTransform;
use super::{GeoTransform, Raster, NODATA};
use rayon::prelude::*;

/// Target grid: size and georeferencing of the rasters to be produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
}

impl GridSpec {
    /// World coordinates of the centre of pixel (col, row)
    pub fn pixel_centre(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.apply(col as f64 + 0.5, row as f64 + 0.5)
    }
}

/// Resample `source` onto `grid` with bilinear interpolation
///
/// Each target pixel centre is mapped into the source pixel space and the
/// four surrounding source pixel centres are weighted by distance. Neighbours
/// that are outside the source, NaN or no-data are dropped and the remaining
/// weights renormalised. Target pixels outside the source extent, or with no
/// valid neighbour, are set to [`NODATA`].
///
/// Both rasters must share a coordinate system. Returns `None` when the
/// source transform cannot be inverted.
pub fn bilinear(source: &Raster, grid: &GridSpec) -> Option<Vec<f32>> {
    sample_grid(source, grid, |col, row| Some(grid.pixel_centre(col, row)))
}

/// Resample `source` onto a `grid` in another coordinate system
///
/// Target pixel centres are transformed into the source CRS by `crs`, then
/// sampled as in [`bilinear`]. Pixels whose centre has no image in the source
/// CRS are set to [`NODATA`].
pub fn bilinear_reprojected(
    source: &Raster,
    grid: &GridSpec,
    crs: &CrsTransform,
) -> Option<Vec<f32>> {
    let positions: Vec<Option<(f64, f64)>> = (0..grid.height)
        .flat_map(|row| (0..grid.width).map(move |col| (col, row)))
        .map(|(col, row)| {
            let (x, y) = grid.pixel_centre(col, row);
            crs.apply(x, y)
        })
        .collect();

    sample_grid(source, grid, |col, row| positions[row * grid.width + col])
}

/// Fill `grid` by sampling `source` at the source-CRS position `world_at`
/// gives for each target pixel
fn sample_grid<F>(source: &Raster, grid: &GridSpec, world_at: F) -> Option<Vec<f32>>
where
    F: Fn(usize, usize) -> Option<(f64, f64)> + Sync,
{
    let to_source = source.header.transform.invert()?;
    let source_width = source.header.width as f64;
    let source_height = source.header.height as f64;

    let mut out = vec![NODATA as f32; grid.width * grid.height];
    if grid.width == 0 {
        return Some(out);
    }

    out.par_chunks_mut(grid.width)
        .enumerate()
        .for_each(|(row, line)| {
            for (col, value) in line.iter_mut().enumerate() {
                let Some((x, y)) = world_at(col, row) else {
                    continue;
                };
                let (u, v) = to_source.apply(x, y);
                if !(0.0..=source_width).contains(&u) || !(0.0..=source_height).contains(&v) {
                    continue;
                }
                if let Some(sample) = interpolate(source, u, v) {
                    *value = sample;
                }
            }
        });

    Some(out)
}

/// Bilinear sample at fractional source pixel position (u, v)
fn interpolate(source: &Raster, u: f64, v: f64) -> Option<f32> {
    // Position relative to the pixel centre grid
    let fu = u - 0.5;
    let fv = v - 0.5;
    let col = fu.floor();
    let row = fv.floor();
    let dx = fu - col;
    let dy = fv - row;
    let (col, row) = (col as i64, row as i64);

    let neighbours = [
        (col, row, (1.0 - dx) * (1.0 - dy)),
        (col + 1, row, dx * (1.0 - dy)),
        (col, row + 1, (1.0 - dx) * dy),
        (col + 1, row + 1, dx * dy),
    ];

    let mut sum = 0.0f64;
    let mut weight_sum = 0.0f64;
    for (c, r, weight) in neighbours {
        if weight <= 0.0 {
            continue;
        }
        match source.get(c, r) {
            Some(sample) if !source.is_nodata(sample) => {
                sum += f64::from(sample) * weight;
                weight_sum += weight;
            }
            _ => {}
        }
    }

    if weight_sum > 0.0 {
        Some((sum / weight_sum) as f32)
    } else {
        None
    }
}
