#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature engineering for a price-paid window.
//!
//! [`FeatureBuilder::label`] turns the transactions of one window into
//! [`FeatureRow`]s: distance to the nearest POI of each configured
//! category and the local median price, computed after an upper-tail
//! outlier trim of the window's sales.
//! [`augment`] adds the property being priced to an already labelled
//! window so it shares the same neighbor pool and POIs.

pub mod trim;

use std::collections::BTreeMap;

pub use trim::{Priced, quantile, trim_outliers};

use geo::Point;
use pricepaid_poi::{PoiError, PoiProvider};
use pricepaid_property_models::{
    BoundingBox, FeatureRow, FeatureSubject, InvalidBoundingBoxError, PoiCategory, PoiDistance,
    PoiFilter, PointOfInterest, QueryProperty, Transaction,
};
use pricepaid_spatial::{DEFAULT_K, PricedPoint, SpatialError, join_categories, local_median};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while building features.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Empty window or an unusable configuration value.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what went wrong.
        message: String,
    },

    /// The window's bounding box is malformed.
    #[error(transparent)]
    InvalidBoundingBox(#[from] InvalidBoundingBoxError),

    /// Spatial join or neighbor search failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// The POI source could not be queried.
    #[error("POI provider error: {0}")]
    PoiProvider(#[from] PoiError),
}

const fn default_k() -> usize {
    DEFAULT_K
}

const fn default_outlier_quantile() -> f64 {
    0.99
}

/// Feature builder settings (the `[features]` table of the predict config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Neighbors per row for the local median price.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Rows priced at or above this quantile of the window are dropped.
    #[serde(default = "default_outlier_quantile")]
    pub outlier_quantile: f64,
    /// POI categories to measure distances to.
    #[serde(default)]
    pub poi_categories: PoiFilter,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            outlier_quantile: default_outlier_quantile(),
            poi_categories: PoiFilter::default(),
        }
    }
}

impl FeatureConfig {
    /// # Errors
    ///
    /// Returns [`FeatureError::InvalidInput`] if `k` is zero, the quantile
    /// is outside `[0, 1]`, or two categories share a distance column name
    /// (the same value listed under two keys).
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.k == 0 {
            return Err(invalid("k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.outlier_quantile) {
            return Err(invalid(format!(
                "outlier_quantile must be within [0, 1], got {}",
                self.outlier_quantile
            )));
        }

        let mut seen: BTreeMap<String, PoiCategory> = BTreeMap::new();
        for category in self.poi_categories.categories() {
            if let Some(first) = seen.insert(category.feature_name(), category.clone()) {
                return Err(invalid(format!(
                    "POI categories {}={} and {}={} both map to {}",
                    first.key,
                    first.value,
                    category.key,
                    category.value,
                    category.feature_name()
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> FeatureError {
    FeatureError::InvalidInput {
        message: message.into(),
    }
}

/// A window of feature rows together with the context they were built in.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledDataset {
    pub rows: Vec<FeatureRow>,
    /// POIs found in `bbox`, reused by [`augment`].
    pub pois: Vec<PointOfInterest>,
    pub filter: PoiFilter,
    pub bbox: BoundingBox,
    /// Neighbor count used for the local median.
    pub k: usize,
    /// Rows removed by the outlier trim.
    pub dropped_outliers: usize,
}

impl LabelledDataset {
    /// The most recently appended query row, if any.
    #[must_use]
    pub fn query_row(&self) -> Option<&FeatureRow> {
        self.rows.iter().rev().find(|r| r.subject.is_query())
    }

    /// Rows with a sale price.
    pub fn priced_rows(&self) -> impl Iterator<Item = &FeatureRow> {
        self.rows.iter().filter(|r| r.price().is_some())
    }

    /// Distance feature names, in filter order.
    #[must_use]
    pub fn distance_features(&self) -> Vec<String> {
        self.filter
            .categories()
            .iter()
            .map(PoiCategory::feature_name)
            .collect()
    }
}

/// Builds labelled windows from transactions and a POI source.
pub struct FeatureBuilder<'a> {
    provider: &'a dyn PoiProvider,
    config: FeatureConfig,
}

impl<'a> FeatureBuilder<'a> {
    #[must_use]
    pub const fn new(provider: &'a dyn PoiProvider, config: FeatureConfig) -> Self {
        Self { provider, config }
    }

    /// Labels one window of transactions.
    ///
    /// Outliers are trimmed first, so neither the neighbor pool nor the
    /// local medians see them. The bounding box of `bbox_side_km` is
    /// centred on the query point and is where POIs are fetched from. Row
    /// order follows `transactions` minus the trimmed outliers.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError`] if `transactions` is empty, the box is
    /// malformed, the POI provider fails, or a coordinate is non-finite.
    pub fn label(
        &self,
        transactions: Vec<Transaction>,
        latitude: f64,
        longitude: f64,
        bbox_side_km: f64,
    ) -> Result<LabelledDataset, FeatureError> {
        self.config.validate()?;
        if transactions.is_empty() {
            return Err(invalid("no transactions to label"));
        }

        let bbox = BoundingBox::around_km(latitude, longitude, bbox_side_km)?;
        let filter = self.config.poi_categories.clone();
        let pois = self.provider.pois_in_bbox(&bbox, &filter)?;

        let (transactions, dropped_outliers) =
            trim_outliers(transactions, self.config.outlier_quantile);
        log::info!(
            "Labelling {} transactions with {} POIs",
            transactions.len(),
            pois.len()
        );

        let subjects = transactions.into_iter().map(FeatureSubject::Sale).collect();
        let rows = derive_rows(subjects, &pois, &filter.categories(), self.config.k)?;

        log::info!(
            "Labelled {} rows ({dropped_outliers} outliers dropped)",
            rows.len()
        );

        Ok(LabelledDataset {
            rows,
            pois,
            filter,
            bbox,
            k: self.config.k,
            dropped_outliers,
        })
    }
}

/// Returns a copy of `labelled` with `query` appended as its last row.
///
/// Distances and local medians are recomputed over the stored POIs for
/// every row, so the query row takes part in the same neighbor search. The
/// outlier trim is not reapplied.
///
/// # Errors
///
/// Returns [`FeatureError::Spatial`] if the query has non-finite
/// coordinates.
pub fn augment(
    labelled: &LabelledDataset,
    query: &QueryProperty,
) -> Result<LabelledDataset, FeatureError> {
    let subjects: Vec<FeatureSubject> = labelled
        .rows
        .iter()
        .map(|r| r.subject.clone())
        .chain(std::iter::once(FeatureSubject::Query(query.clone())))
        .collect();

    let rows = derive_rows(
        subjects,
        &labelled.pois,
        &labelled.filter.categories(),
        labelled.k,
    )?;

    Ok(LabelledDataset {
        rows,
        pois: labelled.pois.clone(),
        filter: labelled.filter.clone(),
        bbox: labelled.bbox,
        k: labelled.k,
        dropped_outliers: labelled.dropped_outliers,
    })
}

fn derive_rows(
    subjects: Vec<FeatureSubject>,
    pois: &[PointOfInterest],
    categories: &[PoiCategory],
    k: usize,
) -> Result<Vec<FeatureRow>, FeatureError> {
    let points: Vec<Point<f64>> = subjects
        .iter()
        .map(|s| Point::new(s.longitude(), s.latitude()))
        .collect();

    let joined = join_categories(&points, pois, categories)?;

    #[allow(clippy::cast_precision_loss)]
    let priced: Vec<PricedPoint> = subjects
        .iter()
        .zip(&points)
        .map(|(s, location)| PricedPoint {
            location: *location,
            price: s.price().map(|p| p as f64),
        })
        .collect();
    let medians = local_median(&priced, k)?;

    Ok(subjects
        .into_iter()
        .zip(medians)
        .enumerate()
        .map(|(i, (subject, local_median_price))| FeatureRow {
            subject,
            poi_distances: joined
                .iter()
                .map(|(category, distances)| PoiDistance {
                    category: category.clone(),
                    meters: distances[i],
                })
                .collect(),
            local_median_price,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pricepaid_poi::MemoryPoiProvider;
    use pricepaid_property_models::{PropertyType, TenureType};

    use super::*;

    fn sale(id: u64, price: u64, lat: f64, lon: f64) -> Transaction {
        Transaction {
            id,
            price,
            date_of_transfer: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
            postcode: format!("CB{id} 2AB"),
            property_type: if id % 2 == 0 {
                PropertyType::Flat
            } else {
                PropertyType::Terraced
            },
            new_build_flag: false,
            tenure_type: TenureType::Freehold,
            locality: String::new(),
            town_city: "CAMBRIDGE".to_string(),
            district: "CAMBRIDGE".to_string(),
            county: "CAMBRIDGESHIRE".to_string(),
            country: "England".to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    fn poi(value: &str, key: &str, lat: f64, lon: f64) -> PointOfInterest {
        PointOfInterest {
            category_key: key.to_string(),
            category_value: value.to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    fn window() -> Vec<Transaction> {
        (1..=20)
            .map(|i| {
                let offset = f64::from(u32::try_from(i).unwrap()) * 0.001;
                sale(i, 100_000 + i * 10_000, 52.2 + offset, 0.12 - offset)
            })
            .collect()
    }

    #[test]
    fn label_adds_one_distance_per_category() {
        let provider = MemoryPoiProvider::new(vec![
            poi("school", "amenity", 52.21, 0.11),
            poi("park", "leisure", 52.19, 0.13),
        ]);
        let builder = FeatureBuilder::new(&provider, FeatureConfig::default());
        let labelled = builder.label(window(), 52.2, 0.12, 15.0).unwrap();

        // 20 prices: the top one sits above the 0.99 quantile
        assert_eq!(labelled.dropped_outliers, 1);
        assert_eq!(labelled.rows.len(), 19);
        assert_eq!(
            labelled.distance_features(),
            vec![
                "dist_to_nearest_school",
                "dist_to_nearest_place_of_worship",
                "dist_to_nearest_park",
            ]
        );

        for row in &labelled.rows {
            assert_eq!(row.poi_distances.len(), 3);
            assert!(row.feature("dist_to_nearest_school").unwrap() >= 0.0);
            assert!(row.feature("dist_to_nearest_park").is_some());
            assert!(
                row.feature("dist_to_nearest_place_of_worship").is_none(),
                "no places of worship were supplied"
            );
            assert!(row.local_median_price.is_some());
        }
    }

    #[test]
    fn label_preserves_input_order() {
        let provider = MemoryPoiProvider::default();
        let mut transactions = window();
        transactions.reverse();
        let builder = FeatureBuilder::new(&provider, FeatureConfig::default());
        let labelled = builder.label(transactions, 52.2, 0.12, 15.0).unwrap();

        let ids: Vec<u64> = labelled
            .rows
            .iter()
            .filter_map(|r| r.subject.transaction().map(|t| t.id))
            .collect();
        let expected: Vec<u64> = (1..=19).rev().collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn label_rejects_empty_window() {
        let provider = MemoryPoiProvider::default();
        let builder = FeatureBuilder::new(&provider, FeatureConfig::default());
        assert!(matches!(
            builder.label(Vec::new(), 52.2, 0.12, 15.0),
            Err(FeatureError::InvalidInput { .. })
        ));
    }

    #[test]
    fn label_rejects_negative_box() {
        let provider = MemoryPoiProvider::default();
        let builder = FeatureBuilder::new(&provider, FeatureConfig::default());
        assert!(matches!(
            builder.label(window(), 52.2, 0.12, -1.0),
            Err(FeatureError::InvalidBoundingBox(_))
        ));
    }

    #[test]
    fn augment_appends_query_without_mutating_input() {
        let provider = MemoryPoiProvider::new(vec![poi("school", "amenity", 52.2, 0.12)]);
        let builder = FeatureBuilder::new(&provider, FeatureConfig::default());
        let labelled = builder.label(window(), 52.2, 0.12, 15.0).unwrap();
        let before = labelled.clone();

        let query = QueryProperty {
            latitude: 52.2,
            longitude: 0.12,
            date: NaiveDate::from_ymd_opt(2020, 4, 14).unwrap(),
            property_type: PropertyType::Flat,
        };
        let augmented = augment(&labelled, &query).unwrap();

        assert_eq!(labelled, before);
        assert_eq!(augmented.rows.len(), labelled.rows.len() + 1);
        assert_eq!(augmented.dropped_outliers, labelled.dropped_outliers);

        let row = augmented.query_row().unwrap();
        assert!(row.price().is_none());
        assert!(row.local_median_price.is_some());
        assert!(row.feature("dist_to_nearest_school").unwrap() < 1e-6);
        assert!(labelled.query_row().is_none());
    }

    #[test]
    fn medians_ignore_trimmed_outliers() {
        // four sales in a line, the last one far above the rest
        let transactions = vec![
            sale(1, 100_000, 52.200, 0.12),
            sale(2, 110_000, 52.201, 0.12),
            sale(3, 120_000, 52.202, 0.12),
            sale(4, 50_000_000, 52.203, 0.12),
        ];
        let provider = MemoryPoiProvider::default();
        let config = FeatureConfig {
            k: 2,
            ..FeatureConfig::default()
        };
        let labelled = FeatureBuilder::new(&provider, config)
            .label(transactions, 52.2, 0.12, 15.0)
            .unwrap();
        assert_eq!(labelled.dropped_outliers, 1);

        let query = QueryProperty {
            latitude: 52.3,
            longitude: 0.3,
            date: NaiveDate::from_ymd_opt(2020, 4, 14).unwrap(),
            property_type: PropertyType::Flat,
        };
        let augmented = augment(&labelled, &query).unwrap();

        let median_of = |rows: &[FeatureRow], id: u64| {
            rows.iter()
                .find(|r| r.subject.transaction().is_some_and(|t| t.id == id))
                .and_then(|r| r.local_median_price)
        };
        assert_eq!(median_of(&labelled.rows, 3), Some(110_000.0));
        assert_eq!(
            median_of(&labelled.rows, 3),
            median_of(&augmented.rows, 3),
            "training and query features must share the same neighbor pool"
        );
    }

    #[test]
    fn rejects_value_listed_under_two_keys() {
        let mut map = BTreeMap::new();
        map.insert("amenity".to_string(), vec!["park".to_string()]);
        map.insert("leisure".to_string(), vec!["park".to_string()]);
        let config = FeatureConfig {
            poi_categories: PoiFilter::new(map),
            ..FeatureConfig::default()
        };
        let provider = MemoryPoiProvider::default();
        let result = FeatureBuilder::new(&provider, config).label(window(), 52.2, 0.12, 15.0);
        assert!(matches!(
            result,
            Err(FeatureError::InvalidInput { message }) if message.contains("dist_to_nearest_park")
        ));
    }

    #[test]
    fn rejects_zero_k() {
        let provider = MemoryPoiProvider::default();
        let config = FeatureConfig {
            k: 0,
            ..FeatureConfig::default()
        };
        let builder = FeatureBuilder::new(&provider, config);
        assert!(builder.label(window(), 52.2, 0.12, 15.0).is_err());
    }
}
