//! Virtual mosaics (GDAL VRT) over per-tile output rasters
//!
//! A mosaic is a small XML document referencing its constituent rasters by
//! path. Moving or deleting a referenced tile invalidates the mosaic.

use super::geotiff::read_header;
use super::{RasterHeader, NODATA};
use crate::error::PipelineError;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Mosaic filename for a source raster: the source stem with `pattern`
/// replaced by `replacement`, plus `.vrt`
///
/// `wind_smooth_100yr.tif` becomes `wind_local_100yr.vrt` with the default
/// substitution.
pub fn mosaic_name(source: &Path, pattern: &str, replacement: &str) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = if pattern.is_empty() {
        stem
    } else {
        stem.replace(pattern, replacement)
    };
    format!("{}.vrt", stem)
}

/// A tile accepted into a mosaic
#[derive(Debug, Clone)]
struct MosaicTile {
    path: PathBuf,
    header: RasterHeader,
}

/// Builds VRT mosaics with bilinear resampling
#[derive(Debug, Clone, Default)]
pub struct MosaicAssembler;

impl MosaicAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Build a mosaic at `mosaic_path` over `outputs`
    ///
    /// Returns `Ok(None)` and logs a warning when there is nothing to mosaic.
    /// Tiles in a different coordinate system from the first, or with
    /// rotated geotransforms, are left out with a warning.
    pub fn build(
        &self,
        outputs: &[PathBuf],
        mosaic_path: &Path,
    ) -> Result<Option<PathBuf>, PipelineError> {
        if outputs.is_empty() {
            warn!(
                mosaic = %mosaic_path.display(),
                "No usable outputs, mosaic not created"
            );
            return Ok(None);
        }

        let mut tiles: Vec<MosaicTile> = Vec::with_capacity(outputs.len());
        for path in outputs {
            let header = read_header(path).map_err(|e| {
                PipelineError::MosaicBuildFailure(format!(
                    "{}: {}",
                    mosaic_path.display(),
                    e
                ))
            })?;

            if !header.transform.is_north_up() || header.transform.0[5] >= 0.0 {
                warn!(tile = %path.display(), "Rotated or south-up tile left out of mosaic");
                continue;
            }
            if let Some(first) = tiles.first() {
                if !first.header.projection.is_compatible(&header.projection) {
                    warn!(
                        tile = %path.display(),
                        projection = %header.projection.describe(),
                        mosaic_projection = %first.header.projection.describe(),
                        "Tile projection differs from mosaic, left out"
                    );
                    continue;
                }
            }
            tiles.push(MosaicTile {
                path: path.clone(),
                header,
            });
        }

        if tiles.is_empty() {
            warn!(
                mosaic = %mosaic_path.display(),
                "No tiles compatible with a mosaic, mosaic not created"
            );
            return Ok(None);
        }

        let vrt_dir = mosaic_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let xml = render_vrt(&tiles, vrt_dir);

        write_atomically(mosaic_path, vrt_dir, xml.as_bytes()).map_err(|e| {
            PipelineError::MosaicBuildFailure(format!("{}: {}", mosaic_path.display(), e))
        })?;

        info!(
            mosaic = %mosaic_path.display(),
            tiles = tiles.len(),
            "Mosaic written"
        );
        Ok(Some(mosaic_path.to_path_buf()))
    }
}

fn write_atomically(path: &Path, dir: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".nwra-")
        .suffix(".part")
        .tempfile_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn render_vrt(tiles: &[MosaicTile], vrt_dir: &Path) -> String {
    // Union extent and average resolution
    let mut min_x = f64::MAX;
    let mut max_y = f64::MIN;
    let mut max_x = f64::MIN;
    let mut min_y = f64::MAX;
    let mut res_x = 0.0;
    let mut res_y = 0.0;
    for tile in tiles {
        let (tile_min_x, tile_min_y, tile_max_x, tile_max_y) = tile.header.bounds();
        min_x = min_x.min(tile_min_x);
        min_y = min_y.min(tile_min_y);
        max_x = max_x.max(tile_max_x);
        max_y = max_y.max(tile_max_y);
        res_x += tile.header.transform.0[1];
        res_y += tile.header.transform.0[5].abs();
    }
    res_x /= tiles.len() as f64;
    res_y /= tiles.len() as f64;

    let width = ((max_x - min_x) / res_x).round().max(1.0) as u64;
    let height = ((max_y - min_y) / res_y).round().max(1.0) as u64;

    let mut xml = String::new();
    let _ = writeln!(xml, r#"<VRTDataset rasterXSize="{}" rasterYSize="{}">"#, width, height);
    if let Some(code) = tiles[0].header.projection.epsg() {
        let _ = writeln!(xml, "  <SRS>EPSG:{}</SRS>", code);
    }
    let _ = writeln!(
        xml,
        "  <GeoTransform>{:.16e}, {:.16e}, {:.16e}, {:.16e}, {:.16e}, {:.16e}</GeoTransform>",
        min_x, res_x, 0.0, max_y, 0.0, -res_y
    );
    let _ = writeln!(xml, r#"  <VRTRasterBand dataType="Float32" band="1">"#);
    let _ = writeln!(xml, "    <NoDataValue>{}</NoDataValue>", NODATA);

    for tile in tiles {
        let gt = tile.header.transform.0;
        let (relative, filename) = source_filename(&tile.path, vrt_dir);
        let dst_x = (gt[0] - min_x) / res_x;
        let dst_y = (max_y - gt[3]) / res_y;
        let dst_width = tile.header.width as f64 * gt[1] / res_x;
        let dst_height = tile.header.height as f64 * gt[5].abs() / res_y;

        debug!(tile = %tile.path.display(), dst_x, dst_y, "Mosaic source");

        let _ = writeln!(xml, r#"    <ComplexSource resampling="bilinear">"#);
        let _ = writeln!(
            xml,
            r#"      <SourceFilename relativeToVRT="{}">{}</SourceFilename>"#,
            relative as u8,
            escape_xml(&filename)
        );
        let _ = writeln!(xml, "      <SourceBand>1</SourceBand>");
        let _ = writeln!(
            xml,
            r#"      <SourceProperties RasterXSize="{w}" RasterYSize="{h}" DataType="Float32" BlockXSize="{w}" BlockYSize="1" />"#,
            w = tile.header.width,
            h = tile.header.height
        );
        let _ = writeln!(
            xml,
            r#"      <SrcRect xOff="0" yOff="0" xSize="{}" ySize="{}" />"#,
            tile.header.width, tile.header.height
        );
        let _ = writeln!(
            xml,
            r#"      <DstRect xOff="{}" yOff="{}" xSize="{}" ySize="{}" />"#,
            dst_x, dst_y, dst_width, dst_height
        );
        let _ = writeln!(xml, "      <NODATA>{}</NODATA>", NODATA);
        let _ = writeln!(xml, "    </ComplexSource>");
    }

    let _ = writeln!(xml, "  </VRTRasterBand>");
    let _ = writeln!(xml, "</VRTDataset>");
    xml
}

/// Source path as written into the VRT: relative when the tile sits in the
/// mosaic's directory, absolute otherwise
fn source_filename(tile: &Path, vrt_dir: &Path) -> (bool, String) {
    match (tile.parent(), tile.file_name()) {
        (Some(parent), Some(name)) if parent == vrt_dir => {
            (true, name.to_string_lossy().to_string())
        }
        _ => (false, tile.to_string_lossy().to_string()),
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
