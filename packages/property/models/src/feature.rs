//! Typed feature rows produced by the feature builder.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{PoiCategory, PropertyType, Transaction};

/// A property we want a price for. It has a location, date and type but
/// no sale price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryProperty {
    pub latitude: f64,
    pub longitude: f64,
    pub date: NaiveDate,
    pub property_type: PropertyType,
}

/// What a feature row describes: a recorded sale or the property being
/// priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureSubject {
    Sale(Transaction),
    Query(QueryProperty),
}

impl FeatureSubject {
    /// Sale price, or `None` for the query property.
    #[must_use]
    pub const fn price(&self) -> Option<u64> {
        match self {
            Self::Sale(t) => Some(t.price),
            Self::Query(_) => None,
        }
    }

    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::Sale(t) => t.property_type,
            Self::Query(q) => q.property_type,
        }
    }

    #[must_use]
    pub const fn latitude(&self) -> f64 {
        match self {
            Self::Sale(t) => t.latitude,
            Self::Query(q) => q.latitude,
        }
    }

    #[must_use]
    pub const fn longitude(&self) -> f64 {
        match self {
            Self::Sale(t) => t.longitude,
            Self::Query(q) => q.longitude,
        }
    }

    #[must_use]
    pub const fn transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Sale(t) => Some(t),
            Self::Query(_) => None,
        }
    }

    #[must_use]
    pub const fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}

/// Distance in metres from a row to the nearest POI of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiDistance {
    pub category: PoiCategory,
    /// `None` when no POI of this category was found in range.
    pub meters: Option<f64>,
}

/// A transaction (or query property) with its derived features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRow {
    pub subject: FeatureSubject,
    /// One entry per requested category, in filter order.
    pub poi_distances: Vec<PoiDistance>,
    /// Median price of the nearest transactions (self-inclusive).
    pub local_median_price: Option<f64>,
}

impl FeatureRow {
    /// Looks up a derived numeric feature by column name.
    ///
    /// Knows `local_median_price` and every `dist_to_nearest_*` column.
    /// Returns `None` for unknown names and for undefined values.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<f64> {
        if name == "local_median_price" {
            return self.local_median_price;
        }
        self.poi_distances
            .iter()
            .find(|d| d.category.feature_name() == name)
            .and_then(|d| d.meters)
    }

    #[must_use]
    pub const fn price(&self) -> Option<u64> {
        self.subject.price()
    }

    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        self.subject.property_type()
    }
}
