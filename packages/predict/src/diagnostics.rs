//! Exploratory views of a labelled window: how price relates to each
//! derived feature and to the categorical columns.

use std::collections::BTreeMap;

use pricepaid_property_models::FeatureRow;
use serde::Serialize;

use crate::render::{CategoryGroup, Chart, ChartRenderer};

/// Pairwise Pearson correlations between price and the numeric features.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    /// `price` first, then `local_median_price`, then distance features.
    pub labels: Vec<String>,
    /// `NaN` where a pair has fewer than two complete observations or no
    /// variance.
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Correlation between two labelled columns.
    #[must_use]
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        Some(self.values[i][j])
    }
}

/// Pearson correlation over the pairs where both values are present.
#[must_use]
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

fn numeric_columns(rows: &[FeatureRow]) -> Vec<String> {
    let mut labels = vec!["price".to_string(), "local_median_price".to_string()];
    if let Some(first) = rows.first() {
        labels.extend(
            first
                .poi_distances
                .iter()
                .map(|d| d.category.feature_name()),
        );
    }
    labels
}

#[allow(clippy::cast_precision_loss)]
fn column_value(row: &FeatureRow, label: &str) -> Option<f64> {
    if label == "price" {
        return row.price().map(|p| p as f64);
    }
    row.feature(label)
}

/// Correlation matrix over the priced rows.
#[must_use]
pub fn correlation_matrix(rows: &[FeatureRow]) -> CorrelationMatrix {
    let labels = numeric_columns(rows);
    let priced: Vec<&FeatureRow> = rows.iter().filter(|r| r.price().is_some()).collect();

    let values = labels
        .iter()
        .map(|a| {
            labels
                .iter()
                .map(|b| {
                    let pairs: Vec<(f64, f64)> = priced
                        .iter()
                        .filter_map(|row| Some((column_value(row, a)?, column_value(row, b)?)))
                        .collect();
                    pearson(&pairs).unwrap_or(f64::NAN)
                })
                .collect()
        })
        .collect();

    CorrelationMatrix { labels, values }
}

/// The `n` features most correlated with price, by absolute correlation.
/// Undefined correlations are skipped.
#[must_use]
pub fn top_correlated(matrix: &CorrelationMatrix, n: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = matrix
        .labels
        .iter()
        .filter(|label| *label != "price")
        .filter_map(|label| {
            let r = matrix.get("price", label)?;
            (!r.is_nan()).then(|| (label.clone(), r))
        })
        .collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    ranked.truncate(n);
    ranked
}

/// One price-against-distance scatter per distance feature.
pub fn render_distance_scatters(renderer: &dyn ChartRenderer, rows: &[FeatureRow]) {
    for label in numeric_columns(rows).iter().skip(2) {
        let points = rows
            .iter()
            .filter_map(|row| Some((row.feature(label)?, column_value(row, "price")?)))
            .collect();
        renderer.render(&Chart::Scatter {
            title: format!("Price vs {label}"),
            x_label: label.clone(),
            y_label: "price".to_string(),
            points,
        });
    }
}

pub fn render_correlation_heatmap(renderer: &dyn ChartRenderer, matrix: &CorrelationMatrix) {
    renderer.render(&Chart::Heatmap {
        title: "Feature correlation".to_string(),
        labels: matrix.labels.clone(),
        values: matrix.values.clone(),
    });
}

fn price_groups(
    rows: &[FeatureRow],
    category: impl Fn(&FeatureRow) -> Option<String>,
) -> Vec<CategoryGroup> {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        if let (Some(name), Some(price)) = (category(row), column_value(row, "price")) {
            groups.entry(name).or_default().push(price);
        }
    }
    groups
        .into_iter()
        .map(|(name, values)| CategoryGroup { name, values })
        .collect()
}

/// Price distribution by property type, new-build flag and tenure (box and
/// violin), and by county (box only).
pub fn render_categorical_plots(renderer: &dyn ChartRenderer, rows: &[FeatureRow]) {
    type Extract = fn(&FeatureRow) -> Option<String>;
    let columns: [(&str, Extract, bool); 4] = [
        (
            "property_type",
            |r| Some(r.property_type().code().to_string()),
            true,
        ),
        (
            "new_build_flag",
            |r| {
                r.subject
                    .transaction()
                    .map(|t| if t.new_build_flag { "Y" } else { "N" }.to_string())
            },
            true,
        ),
        (
            "tenure_type",
            |r| r.subject.transaction().map(|t| t.tenure_type.code().to_string()),
            true,
        ),
        (
            "county",
            |r| r.subject.transaction().map(|t| t.county.clone()),
            false,
        ),
    ];

    for (column, extract, violin) in columns {
        let groups = price_groups(rows, extract);
        renderer.render(&Chart::Box {
            title: format!("Price by {column}"),
            category_label: column.to_string(),
            value_label: "price".to_string(),
            groups: groups.clone(),
        });
        if violin {
            renderer.render(&Chart::Violin {
                title: format!("Price distribution by {column}"),
                category_label: column.to_string(),
                value_label: "price".to_string(),
                groups,
            });
        }
    }
}

/// Every diagnostic chart for a window, plus a log line naming the
/// features most correlated with price.
pub fn render_window(renderer: &dyn ChartRenderer, rows: &[FeatureRow]) {
    let matrix = correlation_matrix(rows);
    for (label, r) in top_correlated(&matrix, 3) {
        log::info!("Correlation of price with {label}: {r:.3}");
    }
    render_correlation_heatmap(renderer, &matrix);
    render_distance_scatters(renderer, rows);
    render_categorical_plots(renderer, rows);
}
