//! Georeferenced raster model and operations
//!
//! Rasters are held as a single band of `f32` samples in row-major order
//! together with a GDAL-ordered affine geotransform and the raw GeoTIFF
//! projection keys.

pub mod combiner;
pub mod geotiff;
pub mod mosaic;
pub mod reproject;
pub mod resample;

pub use combiner::RasterCombiner;
pub use geotiff::{read_header, read_raster, write_raster, RasterError};
pub use mosaic::{mosaic_name, MosaicAssembler};
pub use reproject::{CrsTransform, ReprojectError};

/// No-data sentinel written to every output raster
pub const NODATA: f64 = -9999.0;

// GeoKey identifiers
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

/// `GTModelTypeGeoKey` value for latitude/longitude rasters
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;

/// GeoKey value meaning "user defined" rather than an EPSG code
const USER_DEFINED: u16 = 32767;

/// `GTRasterTypeGeoKey` value for point-sampled rasters
pub const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Affine pixel-to-world transform in GDAL order:
/// `[origin_x, pixel_width, row_rotation, origin_y, column_rotation, pixel_height]`
///
/// `pixel_height` is negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform with square-or-not pixels of the given size
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform([origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height.abs()])
    }

    /// World coordinates of fractional pixel position (col, row)
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let gt = &self.0;
        (
            gt[0] + col * gt[1] + row * gt[2],
            gt[3] + col * gt[4] + row * gt[5],
        )
    }

    /// World-to-pixel transform, or `None` when degenerate
    pub fn invert(&self) -> Option<GeoTransform> {
        let gt = &self.0;
        let det = gt[1] * gt[5] - gt[2] * gt[4];
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(GeoTransform([
            (gt[2] * gt[3] - gt[0] * gt[5]) / det,
            gt[5] / det,
            -gt[2] / det,
            (gt[0] * gt[4] - gt[1] * gt[3]) / det,
            -gt[4] / det,
            gt[1] / det,
        ]))
    }

    /// No rotation terms
    pub fn is_north_up(&self) -> bool {
        self.0[2] == 0.0 && self.0[4] == 0.0
    }

    /// Shift the origin by a fractional number of pixels
    pub fn offset(&self, cols: f64, rows: f64) -> GeoTransform {
        let (x, y) = self.apply(cols, rows);
        let mut gt = self.0;
        gt[0] = x;
        gt[3] = y;
        GeoTransform(gt)
    }
}

/// Coordinate reference system as carried by GeoTIFF tags
///
/// The key directory is kept verbatim so an output can carry exactly the
/// projection of the raster it was aligned to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    pub geo_keys: Vec<u16>,
    pub double_params: Vec<f64>,
    pub ascii_params: String,
}

impl Projection {
    /// Minimal key directory for an EPSG code
    ///
    /// Codes in 4000..5000 are treated as geographic, anything else as
    /// projected.
    pub fn from_epsg(code: u16) -> Self {
        let (model_type, key) = if (4000..5000).contains(&code) {
            (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
        } else {
            (1, PROJECTED_CS_TYPE)
        };
        Projection {
            geo_keys: vec![
                1, 1, 0, 3,
                GT_MODEL_TYPE, 0, 1, model_type,
                GT_RASTER_TYPE, 0, 1, 1,
                key, 0, 1, code,
            ],
            double_params: Vec::new(),
            ascii_params: String::new(),
        }
    }

    pub fn is_unspecified(&self) -> bool {
        self.geo_keys.is_empty()
    }

    /// Inline value of a GeoKey
    pub fn key(&self, id: u16) -> Option<u16> {
        let header = self.geo_keys.get(..4)?;
        let count = header[3] as usize;
        self.geo_keys[4..]
            .chunks_exact(4)
            .take(count)
            .find(|entry| entry[0] == id && entry[1] == 0)
            .map(|entry| entry[3])
    }

    /// EPSG code of the projected or geographic CRS, if one is declared
    pub fn epsg(&self) -> Option<u16> {
        [PROJECTED_CS_TYPE, GEOGRAPHIC_TYPE]
            .into_iter()
            .filter_map(|id| self.key(id))
            .find(|code| *code != 0 && *code != USER_DEFINED)
    }

    /// Coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        match self.key(GT_MODEL_TYPE) {
            Some(model_type) => model_type == MODEL_TYPE_GEOGRAPHIC,
            None => self.key(PROJECTED_CS_TYPE).is_none() && self.key(GEOGRAPHIC_TYPE).is_some(),
        }
    }

    pub fn raster_type(&self) -> Option<u16> {
        self.key(GT_RASTER_TYPE)
    }

    /// Whether rasters in `self` and `other` can be aligned without a
    /// coordinate transformation
    ///
    /// An unspecified projection is assumed to match anything.
    pub fn is_compatible(&self, other: &Projection) -> bool {
        if self.is_unspecified() || other.is_unspecified() || self == other {
            return true;
        }
        match (self.epsg(), other.epsg()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Human-readable description for logs and VRT `SRS` elements
    pub fn describe(&self) -> String {
        match self.epsg() {
            Some(code) => format!("EPSG:{}", code),
            None if self.is_unspecified() => "unspecified".to_string(),
            None => self
                .ascii_params
                .trim_end_matches(['|', '\0'])
                .to_string(),
        }
    }
}

/// Size, georeferencing and no-data value of a raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterHeader {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub projection: Projection,
    pub nodata: Option<f64>,
}

impl RasterHeader {
    /// World-space bounds as (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(self.width as f64, 0.0),
            self.transform.apply(0.0, self.height as f64),
            self.transform.apply(self.width as f64, self.height as f64),
        ];
        corners.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Single-band raster held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub header: RasterHeader,
    /// Row-major samples, `width * height` long
    pub data: Vec<f32>,
}

impl Raster {
    pub fn new(header: RasterHeader, data: Vec<f32>) -> Self {
        debug_assert_eq!(header.pixel_count(), data.len());
        Self { header, data }
    }

    /// Sample at (col, row), `None` when outside the raster
    pub fn get(&self, col: i64, row: i64) -> Option<f32> {
        if col < 0 || row < 0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.header.width || row >= self.header.height {
            return None;
        }
        self.data.get(row * self.header.width + col).copied()
    }

    /// NaN or equal to the raster's declared no-data value
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan()
            || self
                .header
                .nodata
                .is_some_and(|nodata| value == nodata as f32)
    }
}
