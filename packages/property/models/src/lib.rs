#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Land Registry price-paid types shared across the pricing pipeline.
//!
//! A [`Transaction`] is one row of the joined price-paid + postcode
//! geocode table. Feature engineering extends transactions into
//! [`FeatureRow`]s, and [`BoundingBox`] / [`TransactionWindow`] describe
//! the spatio-temporal window a prediction trains on.

pub mod area;
pub mod feature;
pub mod poi;

pub use area::{BoundingBox, InvalidBoundingBoxError, TransactionWindow, km_to_degrees};
pub use feature::{FeatureRow, FeatureSubject, PoiDistance, QueryProperty};
pub use poi::{ANY_VALUE, PoiCategory, PoiFilter, PointOfInterest};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Land Registry property type, stored as its single-letter code.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum PropertyType {
    /// `D`
    #[serde(rename = "D")]
    #[strum(serialize = "D")]
    Detached,
    /// `S`
    #[serde(rename = "S")]
    #[strum(serialize = "S")]
    SemiDetached,
    /// `T`
    #[serde(rename = "T")]
    #[strum(serialize = "T")]
    Terraced,
    /// `F` (flats and maisonettes)
    #[serde(rename = "F")]
    #[strum(serialize = "F")]
    Flat,
    /// `O` (anything the registry could not classify)
    #[serde(rename = "O")]
    #[strum(serialize = "O")]
    Other,
}

impl PropertyType {
    /// Returns every property type in code order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Detached,
            Self::SemiDetached,
            Self::Terraced,
            Self::Flat,
            Self::Other,
        ]
    }

    /// Returns the single-letter Land Registry code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Detached => "D",
            Self::SemiDetached => "S",
            Self::Terraced => "T",
            Self::Flat => "F",
            Self::Other => "O",
        }
    }
}

/// Duration of the estate.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum TenureType {
    /// `F`
    #[serde(rename = "F")]
    #[strum(serialize = "F")]
    Freehold,
    /// `L`
    #[serde(rename = "L")]
    #[strum(serialize = "L")]
    Leasehold,
    /// `U` (unknown)
    #[serde(rename = "U")]
    #[strum(serialize = "U")]
    Other,
}

impl TenureType {
    /// Returns the single-letter Land Registry code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Freehold => "F",
            Self::Leasehold => "L",
            Self::Other => "U",
        }
    }
}

/// A single price-paid transaction joined with its postcode's coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Surrogate id assigned when the row was loaded.
    pub id: u64,
    /// Sale price in pounds.
    pub price: u64,
    /// Completion date on the transfer deed.
    pub date_of_transfer: NaiveDate,
    /// Full postcode (e.g. "CB2 1TN").
    pub postcode: String,
    pub property_type: PropertyType,
    /// Whether the property was newly built at the time of sale.
    pub new_build_flag: bool,
    pub tenure_type: TenureType,
    pub locality: String,
    pub town_city: String,
    pub district: String,
    pub county: String,
    pub country: String,
    /// WGS84 latitude of the postcode centroid.
    pub latitude: f64,
    /// WGS84 longitude of the postcode centroid.
    pub longitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn property_type_code_roundtrip() {
        for property_type in PropertyType::all() {
            let parsed = PropertyType::from_str(property_type.code()).unwrap();
            assert_eq!(parsed, *property_type);
        }
        assert!(PropertyType::from_str("X").is_err());
    }

    #[test]
    fn tenure_type_parses_registry_codes() {
        assert_eq!(TenureType::from_str("F").unwrap(), TenureType::Freehold);
        assert_eq!(TenureType::from_str("L").unwrap(), TenureType::Leasehold);
        assert_eq!(TenureType::from_str("U").unwrap(), TenureType::Other);
    }
}
