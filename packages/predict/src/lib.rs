#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Single-property price estimation.
//!
//! [`predict_price`] runs the whole pipeline for one [`QueryProperty`]:
//!
//! 1. select the spatio-temporal window from the repository
//! 2. label it with POI distances and local median prices
//! 3. split, fit and validate the OLS model
//! 4. add the query to the window and score it
//!
//! Each call is independent; nothing is cached between calls.

pub mod config;
pub mod diagnostics;
pub mod render;

pub use config::PredictConfig;
pub use render::{Chart, ChartRenderer, JsonChartRenderer, LogChartRenderer, NoopChartRenderer};

use pricepaid_database::{DbError, TransactionRepository};
use pricepaid_features::{FeatureBuilder, FeatureError, augment};
use pricepaid_poi::{PoiError, PoiProvider};
use pricepaid_property_models::{QueryProperty, TransactionWindow};
use pricepaid_regression::{Metrics, Prediction, RegressionError, TrainOutcome, predict, train};
use serde::Serialize;
use thiserror::Error;

/// Errors that can abort a prediction.
#[derive(Debug, Error)]
pub enum PredictError {
    /// The transaction store could not be queried.
    #[error("Repository error: {0}")]
    Repository(#[from] DbError),

    /// The POI source could not be queried.
    #[error("POI provider error: {0}")]
    PoiProvider(#[from] PoiError),

    /// Feature building failed.
    #[error("Feature error: {0}")]
    Features(FeatureError),

    /// Fitting or scoring failed.
    #[error("Regression error: {0}")]
    Regression(#[from] RegressionError),

    /// Malformed query or window.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what went wrong.
        message: String,
    },

    /// Malformed configuration file.
    #[error("Config error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// I/O error (e.g. reading a config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FeatureError> for PredictError {
    fn from(e: FeatureError) -> Self {
        match e {
            FeatureError::PoiProvider(e) => Self::PoiProvider(e),
            other => Self::Features(other),
        }
    }
}

/// A non-fatal concern about the fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelWarning {
    /// The held-out R² fell below the configured threshold.
    LowRSquared { r_squared: f64, threshold: f64 },
}

impl std::fmt::Display for ModelWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowRSquared {
                r_squared,
                threshold,
            } => write!(
                f,
                "held-out R² {r_squared:.3} is below {threshold}; the estimate is unreliable"
            ),
        }
    }
}

/// The estimate for one property and how it was obtained.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePrediction {
    pub query: QueryProperty,
    pub prediction: Prediction,
    pub metrics: Metrics,
    /// Model coefficients by column name.
    pub coefficients: Vec<(String, f64)>,
    /// Transactions returned for the window.
    pub window_transactions: usize,
    pub dropped_outliers: usize,
    /// Priced rows excluded from fitting for undefined features.
    pub excluded_rows: usize,
    pub warnings: Vec<ModelWarning>,
}

/// Estimates the price of `query` from nearby recent sales.
///
/// # Errors
///
/// * [`PredictError::Repository`] / [`PredictError::PoiProvider`] if an
///   upstream source fails
/// * [`PredictError::Features`] if the window is empty or malformed
/// * [`PredictError::Regression`] if there is too little data to fit and
///   validate the model, or the query cannot be scored
pub fn predict_price(
    repository: &dyn TransactionRepository,
    poi_provider: &dyn PoiProvider,
    renderer: &dyn ChartRenderer,
    query: &QueryProperty,
    config: &PredictConfig,
) -> Result<PricePrediction, PredictError> {
    let window = TransactionWindow::around(
        query.latitude,
        query.longitude,
        query.date,
        config.bbox_length_km,
        config.date_window_days,
    )
    .map_err(|e| PredictError::InvalidInput {
        message: e.to_string(),
    })?;

    let transactions = repository.transactions_in_window(&window)?;
    let window_transactions = transactions.len();
    log::info!(
        "Selected {window_transactions} transactions between {} and {}",
        window.start,
        window.end
    );

    let labelled = FeatureBuilder::new(poi_provider, config.features.clone()).label(
        transactions,
        query.latitude,
        query.longitude,
        config.bbox_length_km,
    )?;

    if config.render_diagnostics {
        diagnostics::render_window(renderer, &labelled.rows);
    }

    let outcome = train(&labelled, &config.regression)?;
    log::info!(
        "Fitted on {} rows: {} residual df, residual variance {:.0}",
        outcome.model.n_train(),
        outcome.model.df_resid(),
        outcome.model.residual_variance()
    );
    render_validation(renderer, &outcome);

    let mut warnings = Vec::new();
    if outcome.metrics.r_squared < config.min_r_squared {
        let warning = ModelWarning::LowRSquared {
            r_squared: outcome.metrics.r_squared,
            threshold: config.min_r_squared,
        };
        log::warn!("{warning}");
        warnings.push(warning);
    }

    let augmented = augment(&labelled, query)?;
    let row = augmented
        .query_row()
        .ok_or_else(|| PredictError::InvalidInput {
            message: "query row missing after augmentation".to_string(),
        })?;
    let prediction = predict(&outcome.model, row)?;

    log::info!(
        "Predicted £{:.0} (prediction interval £{:.0} to £{:.0})",
        prediction.mean,
        prediction.obs_ci_lower,
        prediction.obs_ci_upper
    );

    Ok(PricePrediction {
        query: query.clone(),
        prediction,
        metrics: outcome.metrics,
        coefficients: outcome.model.coefficients(),
        window_transactions,
        dropped_outliers: labelled.dropped_outliers,
        excluded_rows: outcome.excluded_rows,
        warnings,
    })
}

/// Actual-vs-predicted and residual scatters for the held-out fold.
fn render_validation(renderer: &dyn ChartRenderer, outcome: &TrainOutcome) {
    renderer.render(&Chart::Scatter {
        title: "Actual vs predicted price".to_string(),
        x_label: "actual".to_string(),
        y_label: "predicted".to_string(),
        points: outcome
            .test_predictions
            .iter()
            .map(|p| (p.actual, p.predicted.mean))
            .collect(),
    });
    renderer.render(&Chart::Scatter {
        title: "Residuals".to_string(),
        x_label: "predicted".to_string(),
        y_label: "residual".to_string(),
        points: outcome
            .test_predictions
            .iter()
            .map(|p| (p.predicted.mean, p.residual()))
            .collect(),
    });
}
