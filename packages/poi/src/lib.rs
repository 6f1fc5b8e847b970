#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point-of-interest sources for distance features.
//!
//! A [`PoiProvider`] answers "which schools, places of worship and parks
//! are inside this box?". [`osm::OsmPbfProvider`] reads them from an
//! `OpenStreetMap` PBF extract; [`MemoryPoiProvider`] serves a fixed list.

pub mod osm;

pub use osm::OsmPbfProvider;

use std::collections::BTreeMap;

use pricepaid_property_models::{BoundingBox, InvalidBoundingBoxError, PoiFilter, PointOfInterest};
use thiserror::Error;

/// Errors that can occur while fetching points of interest.
#[derive(Debug, Error)]
pub enum PoiError {
    /// PBF file not found.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// PBF parsing error.
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// Path to the PBF file.
        path: String,
        /// Error description.
        message: String,
    },

    /// The requested box is malformed.
    #[error(transparent)]
    InvalidBoundingBox(#[from] InvalidBoundingBoxError),
}

/// Source of points of interest, queried by bounding box.
pub trait PoiProvider {
    /// Returns every POI inside `bbox` (edges inclusive) whose tag matches
    /// one of the categories in `filter`. A feature carrying several
    /// requested tags is returned once per matching tag.
    ///
    /// # Errors
    ///
    /// Returns [`PoiError`] if the box is malformed or the source cannot
    /// be read.
    fn pois_in_bbox(
        &self,
        bbox: &BoundingBox,
        filter: &PoiFilter,
    ) -> Result<Vec<PointOfInterest>, PoiError>;
}

/// A provider over a fixed, in-memory list of POIs.
#[derive(Debug, Clone, Default)]
pub struct MemoryPoiProvider {
    pois: Vec<PointOfInterest>,
}

impl MemoryPoiProvider {
    #[must_use]
    pub const fn new(pois: Vec<PointOfInterest>) -> Self {
        Self { pois }
    }
}

impl PoiProvider for MemoryPoiProvider {
    fn pois_in_bbox(
        &self,
        bbox: &BoundingBox,
        filter: &PoiFilter,
    ) -> Result<Vec<PointOfInterest>, PoiError> {
        bbox.validate()?;

        Ok(self
            .pois
            .iter()
            .filter(|poi| bbox.contains(poi.latitude, poi.longitude))
            .filter(|poi| filter.matches(&poi.category_key, &poi.category_value))
            .cloned()
            .collect())
    }
}

/// Counts POI values under one tag key and returns the `n` most common,
/// most frequent first (ties by value).
#[must_use]
pub fn most_common_values(pois: &[PointOfInterest], key: &str, n: usize) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for poi in pois.iter().filter(|p| p.category_key == key) {
        *counts.entry(poi.category_value.as_str()).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(key: &str, value: &str, lat: f64, lon: f64) -> PointOfInterest {
        PointOfInterest {
            category_key: key.to_string(),
            category_value: value.to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn memory_provider_filters_box_and_tags() {
        let bbox = BoundingBox::around(52.2, 0.12, 0.2).unwrap();
        let provider = MemoryPoiProvider::new(vec![
            poi("amenity", "school", 52.2, 0.12),
            poi("amenity", "school", 53.5, 0.12),
            poi("amenity", "cafe", 52.2, 0.12),
            poi("leisure", "park", bbox.north, bbox.west),
        ]);

        let found = provider
            .pois_in_bbox(&bbox, &PoiFilter::default())
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].category_value, "school");
        assert_eq!(found[1].category_value, "park");
    }

    #[test]
    fn memory_provider_rejects_malformed_box() {
        let provider = MemoryPoiProvider::default();
        let bbox = BoundingBox {
            north: 51.0,
            south: 52.0,
            east: 1.0,
            west: 0.0,
        };
        assert!(matches!(
            provider.pois_in_bbox(&bbox, &PoiFilter::default()),
            Err(PoiError::InvalidBoundingBox(_))
        ));
    }

    #[test]
    fn ranks_most_common_values() {
        let pois = vec![
            poi("amenity", "school", 0.0, 0.0),
            poi("amenity", "cafe", 0.0, 0.0),
            poi("amenity", "school", 0.0, 0.0),
            poi("amenity", "bench", 0.0, 0.0),
            poi("leisure", "park", 0.0, 0.0),
        ];
        let top = most_common_values(&pois, "amenity", 2);
        assert_eq!(
            top,
            vec![("school".to_string(), 2), ("bench".to_string(), 1)]
        );
    }

    #[test]
    fn whole_key_filter_finds_unconfigured_values() {
        let bbox = BoundingBox::around(52.2, 0.12, 0.2).unwrap();
        let provider = MemoryPoiProvider::new(vec![
            poi("amenity", "pub", 52.2, 0.12),
            poi("amenity", "pub", 52.21, 0.12),
            poi("amenity", "school", 52.2, 0.13),
            poi("leisure", "park", 52.2, 0.12),
        ]);

        let configured = provider
            .pois_in_bbox(&bbox, &PoiFilter::default())
            .unwrap();
        assert!(most_common_values(&configured, "amenity", 5)
            .iter()
            .all(|(value, _)| value != "pub"));

        let all = provider
            .pois_in_bbox(&bbox, &PoiFilter::any_value(["amenity"]))
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(
            most_common_values(&all, "amenity", 5),
            vec![("pub".to_string(), 2), ("school".to_string(), 1)]
        );
    }
}
