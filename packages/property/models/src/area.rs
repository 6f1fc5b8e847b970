//! Geographic and temporal windows used to select training data.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Kilometres per degree, using the ~40,000 km circumference of the Earth.
const KM_PER_DEGREE: f64 = 40_000.0 / 360.0;

/// Converts a distance in kilometres to an approximate number of degrees.
///
/// One degree is roughly 111 km. The approximation ignores the shrinking
/// of longitude degrees with latitude, matching how the window was
/// historically sized.
#[must_use]
pub fn km_to_degrees(km: f64) -> f64 {
    km / KM_PER_DEGREE
}

/// An axis-aligned latitude/longitude rectangle. All edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

/// Error returned when a [`BoundingBox`] has inverted or non-finite edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidBoundingBoxError {
    /// The rejected box.
    pub bbox: BoundingBox,
}

impl std::fmt::Display for InvalidBoundingBoxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "malformed bounding box (north={}, south={}, east={}, west={})",
            self.bbox.north, self.bbox.south, self.bbox.east, self.bbox.west
        )
    }
}

impl std::error::Error for InvalidBoundingBoxError {}

impl BoundingBox {
    /// Creates a box from its edges, rejecting inverted or non-finite edges.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBoundingBoxError`] if `north < south`, `east < west`,
    /// or any edge is NaN or infinite.
    pub fn new(
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    ) -> Result<Self, InvalidBoundingBoxError> {
        let bbox = Self {
            north,
            south,
            east,
            west,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Returns the square box of side `side_degrees` centred on a point.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBoundingBoxError`] if the side is negative or any
    /// input is non-finite.
    pub fn around(
        latitude: f64,
        longitude: f64,
        side_degrees: f64,
    ) -> Result<Self, InvalidBoundingBoxError> {
        let half = side_degrees / 2.0;
        Self::new(
            latitude + half,
            latitude - half,
            longitude + half,
            longitude - half,
        )
    }

    /// Like [`Self::around`] with the side given in kilometres.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBoundingBoxError`] if the resulting box is malformed.
    pub fn around_km(
        latitude: f64,
        longitude: f64,
        side_km: f64,
    ) -> Result<Self, InvalidBoundingBoxError> {
        Self::around(latitude, longitude, km_to_degrees(side_km))
    }

    /// Checks that all edges are finite and not inverted.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBoundingBoxError`] if the box is malformed.
    pub fn validate(&self) -> Result<(), InvalidBoundingBoxError> {
        let finite = [self.north, self.south, self.east, self.west]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.north < self.south || self.east < self.west {
            return Err(InvalidBoundingBoxError { bbox: *self });
        }
        Ok(())
    }

    /// Returns `true` if the point lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude)
            && (self.west..=self.east).contains(&longitude)
    }
}

/// A bounding box plus a half-open `[start, end)` range of transfer dates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionWindow {
    pub bbox: BoundingBox,
    /// First date included.
    pub start: NaiveDate,
    /// First date excluded.
    pub end: NaiveDate,
}

impl TransactionWindow {
    /// Builds the window of `side_km` around a point and `days` either side
    /// of `date`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidBoundingBoxError`] if the box is malformed.
    pub fn around(
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
        side_km: f64,
        days: u64,
    ) -> Result<Self, InvalidBoundingBoxError> {
        let bbox = BoundingBox::around_km(latitude, longitude, side_km)?;
        let span = Days::new(days);
        Ok(Self {
            bbox,
            start: date.checked_sub_days(span).unwrap_or(NaiveDate::MIN),
            end: date.checked_add_days(span).unwrap_or(NaiveDate::MAX),
        })
    }

    /// Returns `true` if a transaction at this date and location falls in
    /// the window.
    #[must_use]
    pub fn contains(&self, date: NaiveDate, latitude: f64, longitude: f64) -> bool {
        date >= self.start && date < self.end && self.bbox.contains(latitude, longitude)
    }
}
