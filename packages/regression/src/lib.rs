#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ordinary least squares price model.
//!
//! [`train`] fits `price ~ const + local_median_price + dist_to_nearest_* +
//! property_type_*` on a seeded 80/20 split of a [`LabelledDataset`] and
//! scores the held-out fold. [`predict`] returns a point estimate with
//! confidence intervals for the mean and for a single new sale.

pub mod design;
pub mod ols;
pub mod split;
pub mod stats;

pub use design::{CategoryEncoding, DesignLayout, INTERCEPT};
pub use split::train_test_split;
pub use stats::{r_squared, rmse, student_t_quantile};

use nalgebra::{DMatrix, DVector};
use pricepaid_features::LabelledDataset;
use pricepaid_property_models::FeatureRow;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while fitting or applying the model.
#[derive(Debug, Error)]
pub enum RegressionError {
    /// Too few usable rows to fit or evaluate.
    #[error("Insufficient data: {message}")]
    InsufficientData {
        /// Description of what went wrong.
        message: String,
    },

    /// A row scored by the model has an undefined feature.
    #[error("Missing feature: {feature}")]
    MissingFeature {
        /// Feature column name.
        feature: String,
    },

    /// A row cannot be encoded with the training-time layout.
    #[error("Incompatible row: {message}")]
    IncompatibleRow {
        /// Description of what went wrong.
        message: String,
    },

    /// The least squares solve failed.
    #[error("Numerical error: {message}")]
    Numerical {
        /// Description of what went wrong.
        message: String,
    },

    /// Configuration value out of range.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what went wrong.
        message: String,
    },
}

const fn default_test_fraction() -> f64 {
    0.2
}

const fn default_seed() -> u64 {
    42
}

const fn default_confidence() -> f64 {
    0.95
}

/// Split and interval settings (the `[regression]` table of the predict
/// config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionConfig {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Two-sided interval coverage.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            confidence: default_confidence(),
        }
    }
}

impl RegressionConfig {
    /// # Errors
    ///
    /// Returns [`RegressionError::InvalidInput`] unless both the test
    /// fraction and the confidence lie strictly between 0 and 1.
    pub fn validate(&self) -> Result<(), RegressionError> {
        for (name, value) in [
            ("test_fraction", self.test_fraction),
            ("confidence", self.confidence),
        ] {
            if value.is_nan() || value <= 0.0 || value >= 1.0 {
                return Err(RegressionError::InvalidInput {
                    message: format!("{name} must be within (0, 1), got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// A point estimate with its intervals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub mean: f64,
    /// Confidence interval for the expected price.
    pub mean_ci_lower: f64,
    pub mean_ci_upper: f64,
    /// Prediction interval for a single sale.
    pub obs_ci_lower: f64,
    pub obs_ci_upper: f64,
}

/// A held-out sale and what the model predicted for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPrediction {
    pub actual: f64,
    pub predicted: Prediction,
}

impl TestPrediction {
    #[must_use]
    pub fn residual(&self) -> f64 {
        self.actual - self.predicted.mean
    }
}

/// Held-out fold metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub rmse: f64,
    pub r_squared: f64,
    pub n_train: usize,
    /// Test rows actually scored.
    pub n_test: usize,
}

/// A fitted OLS model with everything needed to score new rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    layout: DesignLayout,
    fit: ols::OlsFit,
    confidence: f64,
    r_squared: f64,
    rmse: f64,
    n_train: usize,
}

impl FittedModel {
    /// Coefficients paired with their column names, in design order.
    #[must_use]
    pub fn coefficients(&self) -> Vec<(String, f64)> {
        self.layout
            .columns()
            .into_iter()
            .zip(self.fit.coefficients.iter().copied())
            .collect()
    }

    #[must_use]
    pub fn coefficient(&self, column: &str) -> Option<f64> {
        self.layout
            .columns()
            .iter()
            .position(|c| c == column)
            .map(|i| self.fit.coefficients[i])
    }

    /// Numeric features the model was fitted on.
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.layout.numeric
    }

    #[must_use]
    pub const fn r_squared(&self) -> f64 {
        self.r_squared
    }

    #[must_use]
    pub const fn rmse(&self) -> f64 {
        self.rmse
    }

    #[must_use]
    pub const fn n_train(&self) -> usize {
        self.n_train
    }

    #[must_use]
    pub const fn residual_variance(&self) -> f64 {
        self.fit.sigma2
    }

    #[must_use]
    pub const fn df_resid(&self) -> usize {
        self.fit.df_resid
    }
}

/// Everything [`train`] produces.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model: FittedModel,
    pub metrics: Metrics,
    pub test_predictions: Vec<TestPrediction>,
    /// Priced rows left out because a feature was undefined.
    pub excluded_rows: usize,
    /// Test rows not scored because their property type was absent from
    /// the training fold.
    pub unseen_category_rows: usize,
}

/// Fits the price model on the priced rows of `labelled` and evaluates it
/// on a held-out fold.
///
/// # Errors
///
/// * [`RegressionError::InvalidInput`] if the configuration is out of range
/// * [`RegressionError::InsufficientData`] if no usable rows remain, the
///   training fold leaves no residual degrees of freedom, or no test row
///   can be scored
/// * [`RegressionError::Numerical`] if the solve fails
pub fn train(
    labelled: &LabelledDataset,
    config: &RegressionConfig,
) -> Result<TrainOutcome, RegressionError> {
    config.validate()?;

    let priced: Vec<&FeatureRow> = labelled.priced_rows().collect();
    if priced.is_empty() {
        return Err(insufficient("no priced rows to train on"));
    }

    let numeric = usable_features(labelled, &priced);
    let usable: Vec<&FeatureRow> = priced
        .iter()
        .copied()
        .filter(|row| numeric.iter().all(|name| row.feature(name).is_some()))
        .collect();
    let excluded_rows = priced.len() - usable.len();
    if excluded_rows > 0 {
        log::info!("Excluding {excluded_rows} rows with undefined features");
    }

    let (train_idx, test_idx) = train_test_split(usable.len(), config.test_fraction, config.seed);
    if train_idx.is_empty() || test_idx.is_empty() {
        return Err(insufficient(format!(
            "{} usable rows cannot be split into non-empty folds",
            usable.len()
        )));
    }

    let train_rows: Vec<&FeatureRow> = train_idx.iter().map(|&i| usable[i]).collect();
    let layout = DesignLayout {
        numeric,
        encoding: CategoryEncoding::fit(train_rows.iter().copied()),
    };

    let (x, y) = design_matrix(&layout, &train_rows)?;
    let fit = ols::fit(&x, &y)?;

    let mut model = FittedModel {
        layout,
        fit,
        confidence: config.confidence,
        r_squared: f64::NAN,
        rmse: f64::NAN,
        n_train: train_rows.len(),
    };

    let mut test_predictions = Vec::with_capacity(test_idx.len());
    let mut unseen_category_rows = 0;
    for row in test_idx.iter().map(|&i| usable[i]) {
        match predict(&model, row) {
            Ok(predicted) => test_predictions.push(TestPrediction {
                actual: price_of(row),
                predicted,
            }),
            Err(RegressionError::IncompatibleRow { .. }) => unseen_category_rows += 1,
            Err(e) => return Err(e),
        }
    }
    if unseen_category_rows > 0 {
        log::warn!("{unseen_category_rows} test rows have a property type unseen in training");
    }

    let actual: Vec<f64> = test_predictions.iter().map(|p| p.actual).collect();
    let predicted: Vec<f64> = test_predictions.iter().map(|p| p.predicted.mean).collect();
    let (Some(test_rmse), Some(test_r_squared)) =
        (rmse(&actual, &predicted), r_squared(&actual, &predicted))
    else {
        return Err(insufficient("no test rows could be scored"));
    };
    model.rmse = test_rmse;
    model.r_squared = test_r_squared;

    let metrics = Metrics {
        rmse: test_rmse,
        r_squared: test_r_squared,
        n_train: model.n_train,
        n_test: test_predictions.len(),
    };

    log::info!(
        "Fitted OLS on {} rows ({} columns, rank {}): RMSE {test_rmse:.2}, R² {test_r_squared:.4} over {} test rows",
        metrics.n_train,
        model.layout.width(),
        model.fit.rank,
        metrics.n_test
    );

    Ok(TrainOutcome {
        model,
        metrics,
        test_predictions,
        excluded_rows,
        unseen_category_rows,
    })
}

/// Scores one row with a fitted model.
///
/// # Errors
///
/// * [`RegressionError::MissingFeature`] if a model feature is undefined
///   for the row
/// * [`RegressionError::IncompatibleRow`] if the row's property type was
///   not seen in training
/// * [`RegressionError::Numerical`] if the interval quantile is undefined
pub fn predict(model: &FittedModel, row: &FeatureRow) -> Result<Prediction, RegressionError> {
    let x = DVector::from_vec(model.layout.encode(row)?);

    let mean = model.fit.mean(&x);
    let mean_variance = model.fit.mean_variance(&x);
    let se_mean = mean_variance.sqrt();
    let se_obs = (model.fit.sigma2 + mean_variance).sqrt();

    #[allow(clippy::cast_precision_loss)]
    let t = student_t_quantile(
        1.0 - (1.0 - model.confidence) / 2.0,
        model.fit.df_resid as f64,
    )
    .ok_or_else(|| RegressionError::Numerical {
        message: format!(
            "t quantile undefined for confidence {} and {} degrees of freedom",
            model.confidence, model.fit.df_resid
        ),
    })?;

    Ok(Prediction {
        mean,
        mean_ci_lower: t.mul_add(-se_mean, mean),
        mean_ci_upper: t.mul_add(se_mean, mean),
        obs_ci_lower: t.mul_add(-se_obs, mean),
        obs_ci_upper: t.mul_add(se_obs, mean),
    })
}

/// `local_median_price` then each distance feature in filter order, minus
/// any feature that is undefined for every priced row.
fn usable_features(labelled: &LabelledDataset, priced: &[&FeatureRow]) -> Vec<String> {
    std::iter::once("local_median_price".to_string())
        .chain(labelled.distance_features())
        .filter(|name| {
            let defined = priced.iter().any(|row| row.feature(name).is_some());
            if !defined {
                log::warn!("Dropping feature {name}: undefined for every row in the window");
            }
            defined
        })
        .collect()
}

fn design_matrix(
    layout: &DesignLayout,
    rows: &[&FeatureRow],
) -> Result<(DMatrix<f64>, DVector<f64>), RegressionError> {
    let mut flat = Vec::with_capacity(rows.len() * layout.width());
    for row in rows {
        flat.extend(layout.encode(row)?);
    }
    let x = DMatrix::from_row_slice(rows.len(), layout.width(), &flat);
    let y = DVector::from_iterator(rows.len(), rows.iter().map(|r| price_of(r)));
    Ok((x, y))
}

#[allow(clippy::cast_precision_loss)]
fn price_of(row: &FeatureRow) -> f64 {
    row.price().map_or(f64::NAN, |p| p as f64)
}

fn insufficient(message: impl Into<String>) -> RegressionError {
    RegressionError::InsufficientData {
        message: message.into(),
    }
}
