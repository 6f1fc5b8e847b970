#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial primitives for price feature engineering.
//!
//! - [`index::GeoIndex`]: R-tree k-nearest-neighbor lookups ranked by
//!   great-circle (haversine) distance.
//! - [`join`]: distance from every property to the nearest point of
//!   interest of a category, measured in Web Mercator metres.
//! - [`median`]: median sale price of each property's nearest neighbors.
//!
//! Points are [`geo::Point`]s with `x = longitude`, `y = latitude`.

pub mod index;
pub mod join;
pub mod median;

pub use index::{GeoIndex, Neighbor};
pub use join::{WebMercator, join_categories, nearest_distance};
pub use median::{DEFAULT_K, PricedPoint, local_median};

use geo::{Distance as _, Haversine, Point};
use thiserror::Error;

/// Errors that can occur during spatial operations.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// Empty point set, zero `k`, or non-finite coordinates.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what went wrong.
        message: String,
    },

    /// Coordinate reprojection failed.
    #[error("Projection error: {message}")]
    Projection {
        /// Description of what went wrong.
        message: String,
    },
}

impl SpatialError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Great-circle distance in metres between two lon/lat points, on the
/// 6 371 008.8 m mean-radius sphere.
#[must_use]
pub fn haversine_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine.distance(a, b)
}

fn check_finite(points: &[Point<f64>]) -> Result<(), SpatialError> {
    if let Some(pos) = points
        .iter()
        .position(|p| !p.x().is_finite() || !p.y().is_finite())
    {
        return Err(SpatialError::invalid(format!(
            "point {pos} has non-finite coordinates"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_is_zero_for_identical_points() {
        let p = Point::new(0.12, 52.2);
        assert!(haversine_distance(p, p).abs() < f64::EPSILON);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let d = haversine_distance(Point::new(0.0, 52.0), Point::new(0.0, 53.0));
        // 1° of arc on the mean sphere
        assert!((d - 111_195.08).abs() < 1.0, "got {d}");
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = Point::new(-1.25, 51.75);
        let b = Point::new(0.12, 52.2);
        assert!((haversine_distance(a, b) - haversine_distance(b, a)).abs() < 1e-6);
    }
}
