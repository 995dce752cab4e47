//! Coordinate transformation between raster coordinate systems
//!
//! Coordinate systems are built from the EPSG code carried in the GeoTIFF
//! keys. Geographic coordinates are degrees on the raster side and radians
//! on the projection library side; [`CrsTransform::apply`] converts at the
//! boundary.

use super::Projection;
use proj4rs::proj::Proj;
use thiserror::Error;

/// A coordinate system that cannot be used for reprojection
#[derive(Debug, Error)]
pub enum ReprojectError {
    /// Projection keys without an EPSG code (user-defined or missing)
    #[error("No EPSG code in projection {0}")]
    NoEpsgCode(String),

    /// EPSG code unknown to the projection library
    #[error("Cannot build coordinate system EPSG:{code}: {reason}")]
    UnknownCrs { code: u16, reason: String },
}

fn build(projection: &Projection) -> Result<Proj, ReprojectError> {
    let code = projection
        .epsg()
        .ok_or_else(|| ReprojectError::NoEpsgCode(projection.describe()))?;
    Proj::from_epsg_code(code).map_err(|e| ReprojectError::UnknownCrs {
        code,
        reason: e.to_string(),
    })
}

/// Point transformation from one raster CRS into another
pub struct CrsTransform {
    from: Proj,
    to: Proj,
    from_geographic: bool,
    to_geographic: bool,
}

impl CrsTransform {
    pub fn new(from: &Projection, to: &Projection) -> Result<Self, ReprojectError> {
        Ok(Self {
            from: build(from)?,
            to: build(to)?,
            from_geographic: from.is_geographic(),
            to_geographic: to.is_geographic(),
        })
    }

    /// Transform one point, `None` when it has no image in the target CRS
    pub fn apply(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let mut point = if self.from_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        proj4rs::transform::transform(&self.from, &self.to, &mut point).ok()?;

        let (tx, ty) = if self.to_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        (tx.is_finite() && ty.is_finite()).then_some((tx, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_central_meridian_maps_to_zone_longitude() {
        let mga55 = Projection::from_epsg(28355);
        let gda94 = Projection::from_epsg(4283);
        let transform = CrsTransform::new(&mga55, &gda94).unwrap();

        // False easting of a UTM zone lies on its central meridian (147E for zone 55)
        let (lon, lat) = transform.apply(500_000.0, 6_015_000.0).unwrap();
        assert!((lon - 147.0).abs() < 1e-6, "lon {}", lon);
        assert!(lat > -36.1 && lat < -35.9, "lat {}", lat);
    }

    #[test]
    fn test_projected_and_back() {
        let mga55 = Projection::from_epsg(28355);
        let gda94 = Projection::from_epsg(4283);
        let forward = CrsTransform::new(&gda94, &mga55).unwrap();
        let inverse = CrsTransform::new(&mga55, &gda94).unwrap();

        let (e, n) = forward.apply(146.5, -36.25).unwrap();
        assert!(e < 500_000.0);
        let (lon, lat) = inverse.apply(e, n).unwrap();
        assert!((lon - 146.5).abs() < 1e-7);
        assert!((lat + 36.25).abs() < 1e-7);
    }

    #[test]
    fn test_unusable_projections_are_rejected() {
        let mga55 = Projection::from_epsg(28355);

        let user_defined = Projection::from_epsg(32767);
        assert!(matches!(
            CrsTransform::new(&user_defined, &mga55),
            Err(ReprojectError::NoEpsgCode(_))
        ));

        let unknown = Projection::from_epsg(1);
        assert!(matches!(
            CrsTransform::new(&mga55, &unknown),
            Err(ReprojectError::UnknownCrs { code: 1, .. })
        ));
    }
}
