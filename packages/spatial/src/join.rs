//! Nearest point-of-interest joins.
//!
//! Distances are measured in a metric CRS: every lon/lat point is
//! reprojected to Web Mercator (EPSG:3857) and the planar distance between
//! projected points is reported in metres. Measuring in raw degrees would
//! weight a degree of longitude the same as a degree of latitude.

use geo::Point;
use pricepaid_property_models::{PoiCategory, PointOfInterest};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use rstar::RTree;

use crate::{SpatialError, check_finite};

const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs +type=crs";
const WEB_MERCATOR_PROJ4: &str =
    "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs";

/// WGS84 → Web Mercator transformer.
pub struct WebMercator {
    from: Proj,
    to: Proj,
}

impl WebMercator {
    /// Builds the source and target projections.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] if either PROJ.4 definition is
    /// rejected.
    pub fn new() -> Result<Self, SpatialError> {
        let from = Proj::from_proj_string(WGS84_PROJ4).map_err(|e| SpatialError::Projection {
            message: format!("failed to build source PROJ.4 '{WGS84_PROJ4}': {e}"),
        })?;
        let to = Proj::from_proj_string(WEB_MERCATOR_PROJ4).map_err(|e| {
            SpatialError::Projection {
                message: format!("failed to build target PROJ.4 '{WEB_MERCATOR_PROJ4}': {e}"),
            }
        })?;
        Ok(Self { from, to })
    }

    /// Projects a lon/lat point to Web Mercator metres.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] if the transform fails.
    pub fn project(&self, point: Point<f64>) -> Result<[f64; 2], SpatialError> {
        // radians in, metres out
        let mut coord = (point.x().to_radians(), point.y().to_radians(), 0.0);
        transform(&self.from, &self.to, &mut coord).map_err(|e| SpatialError::Projection {
            message: format!("CRS transform failed for ({}, {}): {e}", point.x(), point.y()),
        })?;
        Ok([coord.0, coord.1])
    }

    fn project_all(&self, points: &[Point<f64>]) -> Result<Vec<[f64; 2]>, SpatialError> {
        points.iter().map(|p| self.project(*p)).collect()
    }
}

/// For every primary point, the projected distance in metres to the
/// nearest POI. The result is aligned with `primary`.
///
/// An empty `pois` slice yields `None` for every primary point.
///
/// # Errors
///
/// Returns [`SpatialError`] if a point has non-finite coordinates or
/// reprojection fails.
pub fn nearest_distance(
    primary: &[Point<f64>],
    pois: &[Point<f64>],
) -> Result<Vec<Option<f64>>, SpatialError> {
    check_finite(primary)?;
    check_finite(pois)?;

    if pois.is_empty() {
        return Ok(vec![None; primary.len()]);
    }

    let mercator = WebMercator::new()?;
    nearest_projected(&mercator, primary, pois)
}

fn nearest_projected(
    mercator: &WebMercator,
    primary: &[Point<f64>],
    pois: &[Point<f64>],
) -> Result<Vec<Option<f64>>, SpatialError> {
    if pois.is_empty() {
        return Ok(vec![None; primary.len()]);
    }

    let tree = RTree::bulk_load(mercator.project_all(pois)?);

    Ok(mercator
        .project_all(primary)?
        .into_iter()
        .map(|p| {
            tree.nearest_neighbor(&p)
                .map(|nearest| (nearest[0] - p[0]).hypot(nearest[1] - p[1]))
        })
        .collect())
}

/// Runs [`nearest_distance`] once per category, matching POIs on both tag
/// key and value.
///
/// Returns one distance vector per category, in the order given.
///
/// # Errors
///
/// Returns [`SpatialError`] if a point has non-finite coordinates or
/// reprojection fails.
pub fn join_categories(
    primary: &[Point<f64>],
    pois: &[PointOfInterest],
    categories: &[PoiCategory],
) -> Result<Vec<(PoiCategory, Vec<Option<f64>>)>, SpatialError> {
    check_finite(primary)?;
    let mercator = WebMercator::new()?;

    categories
        .iter()
        .map(|category| {
            let matching: Vec<Point<f64>> = pois
                .iter()
                .filter(|poi| poi.is(category))
                .map(|poi| Point::new(poi.longitude, poi.latitude))
                .collect();
            check_finite(&matching)?;

            if matching.is_empty() {
                log::warn!(
                    "No {}={} POIs in range; {} will be undefined",
                    category.key,
                    category.value,
                    category.feature_name()
                );
            } else {
                log::debug!(
                    "Joining {} points against {} {}={} POIs",
                    primary.len(),
                    matching.len(),
                    category.key,
                    category.value
                );
            }

            let distances = nearest_projected(&mercator, primary, &matching)?;
            Ok((category.clone(), distances))
        })
        .collect()
}
