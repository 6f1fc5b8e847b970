//! Points of interest and the category filter used to request them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A tagged point feature (e.g. `amenity=school`) returned by a POI provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointOfInterest {
    /// Tag key, e.g. `"amenity"`.
    pub category_key: String,
    /// Tag value, e.g. `"school"`.
    pub category_value: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl PointOfInterest {
    /// Returns `true` if this POI belongs to the given category.
    #[must_use]
    pub fn is(&self, category: &PoiCategory) -> bool {
        self.category_key == category.key && self.category_value == category.value
    }
}

/// A single `key=value` tag pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoiCategory {
    pub key: String,
    pub value: String,
}

impl PoiCategory {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Name of the derived distance column, e.g. `dist_to_nearest_school`.
    #[must_use]
    pub fn feature_name(&self) -> String {
        format!("dist_to_nearest_{}", self.value)
    }
}

/// Tag value that matches every value of its key, e.g. `amenity = ["*"]`.
pub const ANY_VALUE: &str = "*";

/// Requested POI categories, grouped by tag key.
///
/// Serialized as a plain `{ key = [values] }` table so it can live in
/// TOML configuration. A key listing [`ANY_VALUE`] matches all of its
/// values but yields no distance category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoiFilter(BTreeMap<String, Vec<String>>);

impl Default for PoiFilter {
    /// Schools and places of worship (`amenity`) plus parks (`leisure`).
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            "amenity".to_string(),
            vec!["school".to_string(), "place_of_worship".to_string()],
        );
        map.insert("leisure".to_string(), vec!["park".to_string()]);
        Self(map)
    }
}

impl PoiFilter {
    #[must_use]
    pub const fn new(categories: BTreeMap<String, Vec<String>>) -> Self {
        Self(categories)
    }

    /// Matches every value of each of `keys`.
    #[must_use]
    pub fn any_value<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            keys.into_iter()
                .map(|key| (key.into(), vec![ANY_VALUE.to_string()]))
                .collect(),
        )
    }

    /// Requested tag keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Flattens the filter into categories, ordered by key then by the
    /// declared value order. [`ANY_VALUE`] entries are skipped.
    #[must_use]
    pub fn categories(&self) -> Vec<PoiCategory> {
        self.0
            .iter()
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .filter(|value| value.as_str() != ANY_VALUE)
                    .map(move |value| PoiCategory::new(key, value))
            })
            .collect()
    }

    /// Returns `true` if the tag pair is one of the requested categories.
    #[must_use]
    pub fn matches(&self, key: &str, value: &str) -> bool {
        self.0
            .get(key)
            .is_some_and(|values| values.iter().any(|v| v.as_str() == ANY_VALUE || v == value))
    }
}
