//! Design matrix layout: intercept, numeric features, then one-hot
//! property type columns.

use pricepaid_property_models::{FeatureRow, PropertyType};
use serde::{Deserialize, Serialize};

use crate::RegressionError;

/// Name of the intercept column.
pub const INTERCEPT: &str = "const";

/// One-hot encoding of property type, fixed from the training fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoding {
    /// Observed categories in enum order; one column each.
    categories: Vec<PropertyType>,
}

impl CategoryEncoding {
    /// Records the distinct property types among `rows`.
    pub fn fit<'a>(rows: impl IntoIterator<Item = &'a FeatureRow>) -> Self {
        let mut categories: Vec<PropertyType> =
            rows.into_iter().map(FeatureRow::property_type).collect();
        categories.sort_unstable();
        categories.dedup();
        Self { categories }
    }

    #[must_use]
    pub fn categories(&self) -> &[PropertyType] {
        &self.categories
    }

    #[must_use]
    pub fn contains(&self, property_type: PropertyType) -> bool {
        self.categories.contains(&property_type)
    }

    /// Column names, e.g. `property_type_F`.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|t| format!("property_type_{}", t.code()))
            .collect()
    }

    /// Appends the one-hot block for `property_type` to `out`.
    fn encode(
        &self,
        property_type: PropertyType,
        out: &mut Vec<f64>,
    ) -> Result<(), RegressionError> {
        if !self.contains(property_type) {
            return Err(RegressionError::IncompatibleRow {
                message: format!(
                    "property type {} was not seen in training",
                    property_type.code()
                ),
            });
        }
        out.extend(
            self.categories
                .iter()
                .map(|t| if *t == property_type { 1.0 } else { 0.0 }),
        );
        Ok(())
    }
}

/// Column layout of the design matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignLayout {
    /// Numeric feature columns, in order.
    pub numeric: Vec<String>,
    pub encoding: CategoryEncoding,
}

impl DesignLayout {
    /// All column names: intercept, numeric features, one-hot columns.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        std::iter::once(INTERCEPT.to_string())
            .chain(self.numeric.iter().cloned())
            .chain(self.encoding.columns())
            .collect()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        1 + self.numeric.len() + self.encoding.categories().len()
    }

    /// Encodes one row into a design vector.
    ///
    /// # Errors
    ///
    /// * [`RegressionError::MissingFeature`] if a numeric feature is undefined
    /// * [`RegressionError::IncompatibleRow`] if its property type has no column
    pub fn encode(&self, row: &FeatureRow) -> Result<Vec<f64>, RegressionError> {
        let mut out = Vec::with_capacity(self.width());
        out.push(1.0);
        for name in &self.numeric {
            let value = row
                .feature(name)
                .ok_or_else(|| RegressionError::MissingFeature {
                    feature: name.clone(),
                })?;
            out.push(value);
        }
        self.encoding.encode(row.property_type(), &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pricepaid_property_models::{FeatureSubject, PoiCategory, PoiDistance, QueryProperty};

    use super::*;

    fn row(property_type: PropertyType, school: Option<f64>) -> FeatureRow {
        FeatureRow {
            subject: FeatureSubject::Query(QueryProperty {
                latitude: 52.2,
                longitude: 0.12,
                date: NaiveDate::from_ymd_opt(2020, 4, 14).unwrap(),
                property_type,
            }),
            poi_distances: vec![PoiDistance {
                category: PoiCategory::new("amenity", "school"),
                meters: school,
            }],
            local_median_price: Some(200_000.0),
        }
    }

    fn layout(rows: &[FeatureRow]) -> DesignLayout {
        DesignLayout {
            numeric: vec![
                "local_median_price".to_string(),
                "dist_to_nearest_school".to_string(),
            ],
            encoding: CategoryEncoding::fit(rows),
        }
    }

    #[test]
    fn one_hot_columns_follow_enum_order() {
        let rows = vec![
            row(PropertyType::Flat, Some(1.0)),
            row(PropertyType::Detached, Some(1.0)),
            row(PropertyType::Flat, Some(1.0)),
        ];
        let layout = layout(&rows);

        assert_eq!(
            layout.columns(),
            vec![
                "const",
                "local_median_price",
                "dist_to_nearest_school",
                "property_type_D",
                "property_type_F",
            ]
        );
        assert_eq!(
            layout.encode(&rows[0]).unwrap(),
            vec![1.0, 200_000.0, 1.0, 0.0, 1.0]
        );
    }

    #[test]
    fn exactly_one_category_column_is_hot() {
        let rows = vec![
            row(PropertyType::Terraced, Some(5.0)),
            row(PropertyType::SemiDetached, Some(5.0)),
            row(PropertyType::Other, Some(5.0)),
        ];
        let layout = layout(&rows);
        for r in &rows {
            let encoded = layout.encode(r).unwrap();
            let hot: f64 = encoded[3..].iter().sum();
            assert!((hot - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn unseen_category_is_incompatible() {
        let layout = layout(&[row(PropertyType::Flat, Some(1.0))]);
        assert!(matches!(
            layout.encode(&row(PropertyType::Detached, Some(1.0))),
            Err(RegressionError::IncompatibleRow { .. })
        ));
    }

    #[test]
    fn undefined_feature_is_missing() {
        let layout = layout(&[row(PropertyType::Flat, Some(1.0))]);
        assert!(matches!(
            layout.encode(&row(PropertyType::Flat, None)),
            Err(RegressionError::MissingFeature { feature }) if feature == "dist_to_nearest_school"
        ));
    }
}
