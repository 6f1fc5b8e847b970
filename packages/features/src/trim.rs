//! Upper-tail price trimming.

use pricepaid_property_models::{FeatureRow, FeatureSubject, Transaction};

/// Anything that may carry a sale price.
pub trait Priced {
    fn sale_price(&self) -> Option<u64>;
}

impl Priced for Transaction {
    fn sale_price(&self) -> Option<u64> {
        Some(self.price)
    }
}

impl Priced for FeatureSubject {
    fn sale_price(&self) -> Option<u64> {
        self.price()
    }
}

impl Priced for FeatureRow {
    fn sale_price(&self) -> Option<u64> {
        self.price()
    }
}

/// The `q`-quantile of `values`, interpolating linearly between the two
/// nearest order statistics (position `q * (n - 1)` in sorted order).
///
/// Returns `None` for an empty slice or a `q` outside `[0, 1]`.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let (lower, upper, fraction) = {
        let position = q * (sorted.len() - 1) as f64;
        let lower = position.floor();
        (lower as usize, position.ceil() as usize, position - lower)
    };

    Some((sorted[upper] - sorted[lower]).mul_add(fraction, sorted[lower]))
}

/// Drops priced items whose price is at or above the `q`-quantile of the
/// priced items. Unpriced items are always kept and order is preserved.
///
/// Returns the kept items and the number dropped.
#[must_use]
pub fn trim_outliers<T: Priced>(items: Vec<T>, q: f64) -> (Vec<T>, usize) {
    #[allow(clippy::cast_precision_loss)]
    let prices: Vec<f64> = items
        .iter()
        .filter_map(Priced::sale_price)
        .map(|p| p as f64)
        .collect();

    let Some(threshold) = quantile(&prices, q) else {
        return (items, 0);
    };

    let before = items.len();
    #[allow(clippy::cast_precision_loss)]
    let kept: Vec<T> = items
        .into_iter()
        .filter(|item| item.sale_price().is_none_or(|p| (p as f64) < threshold))
        .collect();
    let dropped = before - kept.len();

    log::debug!("Dropped {dropped} rows priced at or above {threshold:.0} (q={q})");

    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pricepaid_property_models::{
        FeatureSubject, PropertyType, QueryProperty, TenureType, Transaction,
    };

    use super::*;

    fn sale(id: u64, price: u64) -> FeatureRow {
        FeatureRow {
            subject: FeatureSubject::Sale(Transaction {
                id,
                price,
                date_of_transfer: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                postcode: String::new(),
                property_type: PropertyType::Terraced,
                new_build_flag: false,
                tenure_type: TenureType::Freehold,
                locality: String::new(),
                town_city: String::new(),
                district: String::new(),
                county: String::new(),
                country: String::new(),
                latitude: 52.2,
                longitude: 0.12,
            }),
            poi_distances: Vec::new(),
            local_median_price: None,
        }
    }

    #[test]
    fn quantile_interpolates_between_order_statistics() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(4.0));
        assert_eq!(quantile(&values, 0.5), Some(2.5));
        // position 0.99 * 3 = 2.97
        let q99 = quantile(&values, 0.99).unwrap();
        assert!((q99 - 3.97).abs() < 1e-12, "got {q99}");
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&values, 1.5), None);
    }

    #[test]
    fn trims_exactly_the_top_tail_in_order() {
        // 100 prices 1..=100: q99 = 99.01, so only 100 goes
        let rows: Vec<FeatureRow> = (1..=100).rev().map(|p| sale(p, p * 1000)).collect();
        let (kept, dropped) = trim_outliers(rows, 0.99);

        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 99);
        let ids: Vec<u64> = kept
            .iter()
            .filter_map(|r| r.subject.transaction().map(|t| t.id))
            .collect();
        let expected: Vec<u64> = (1..=99).rev().collect();
        assert_eq!(ids, expected, "order must be preserved");
    }

    #[test]
    fn identical_prices_are_all_at_the_threshold() {
        let rows = vec![sale(1, 5000), sale(2, 5000), sale(3, 5000)];
        let (kept, dropped) = trim_outliers(rows, 0.99);
        assert!(kept.is_empty());
        assert_eq!(dropped, 3);
    }

    #[test]
    fn keeps_unpriced_rows() {
        let query = FeatureRow {
            subject: FeatureSubject::Query(QueryProperty {
                latitude: 52.2,
                longitude: 0.12,
                date: NaiveDate::from_ymd_opt(2020, 4, 14).unwrap(),
                property_type: PropertyType::Flat,
            }),
            poi_distances: Vec::new(),
            local_median_price: None,
        };
        let rows = vec![sale(1, 100), sale(2, 200), query];
        let (kept, dropped) = trim_outliers(rows, 0.5);

        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert!(kept[1].subject.is_query());
    }
}
