#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the price estimation pipeline.
//!
//! Reads transactions from the price-paid `DuckDB` file and points of
//! interest from an `OpenStreetMap` PBF extract. Set `RUST_LOG=info` to see
//! each pipeline stage.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pricepaid_database::{DuckDbRepository, TransactionRepository as _, paths};
use pricepaid_poi::{MemoryPoiProvider, OsmPbfProvider, PoiProvider, most_common_values};
use pricepaid_predict::{
    ChartRenderer, JsonChartRenderer, LogChartRenderer, PredictConfig, predict_price,
};
use pricepaid_property_models::{BoundingBox, PoiFilter, PropertyType, QueryProperty};

#[derive(Parser)]
#[command(name = "pricepaid", about = "UK price-paid property price estimation")]
struct Cli {
    /// `DuckDB` file holding `prices_coordinates_data` (defaults to
    /// `$PRICEPAID_DB` or `data/prices.duckdb`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML config overriding the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the price of one property
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        /// Valuation date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Land Registry code: D, S, T, F or O
        #[arg(long)]
        property_type: PropertyType,
        /// OSM `.pbf` extract to read POIs from; without it every distance
        /// feature is dropped
        #[arg(long)]
        osm: Option<PathBuf>,
        /// Write every chart as a JSON line to this file instead of logging
        /// a summary
        #[arg(long)]
        charts: Option<PathBuf>,
        /// Also render correlation, distance and category charts
        #[arg(long)]
        diagnostics: bool,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Count empty or NULL values per column of the joined table
    Nulls,
    /// Rank every tag value found under each key around a point
    Pois {
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        #[arg(long)]
        osm: PathBuf,
        /// Side of the box in kilometres
        #[arg(long, default_value_t = 15.0)]
        bbox_km: f64,
        /// Values shown per tag key
        #[arg(long, default_value_t = 10)]
        top: usize,
        /// Tag key to rank (repeatable); defaults to the configured keys
        #[arg(long = "key")]
        keys: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PredictConfig::load(path)?,
        None => PredictConfig::embedded(),
    };

    match cli.command {
        Commands::Predict {
            latitude,
            longitude,
            date,
            property_type,
            osm,
            charts,
            diagnostics,
            json,
        } => {
            let query = QueryProperty {
                latitude,
                longitude,
                date,
                property_type,
            };
            let config = PredictConfig {
                render_diagnostics: config.render_diagnostics || diagnostics,
                ..config
            };
            run_predict(
                cli.db.as_deref(),
                osm.as_deref(),
                charts.as_deref(),
                &query,
                &config,
                json,
            )?;
        }
        Commands::Nulls => run_nulls(cli.db.as_deref())?,
        Commands::Pois {
            latitude,
            longitude,
            osm,
            bbox_km,
            top,
            keys,
        } => {
            let filter = if keys.is_empty() {
                PoiFilter::any_value(config.features.poi_categories.keys())
            } else {
                PoiFilter::any_value(keys)
            };
            run_pois(&osm, latitude, longitude, bbox_km, top, &filter)?;
        }
    }

    Ok(())
}

fn open_repository(db: Option<&Path>) -> Result<DuckDbRepository, Box<dyn std::error::Error>> {
    let path = db.map_or_else(paths::default_db_path, Path::to_path_buf);
    Ok(DuckDbRepository::open(&path)?)
}

fn run_predict(
    db: Option<&Path>,
    osm: Option<&Path>,
    charts: Option<&Path>,
    query: &QueryProperty,
    config: &PredictConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let repository = open_repository(db)?;
    log::info!("{} transactions in store", repository.count()?);

    let provider: Box<dyn PoiProvider> = match osm {
        Some(path) => {
            let provider = OsmPbfProvider::new(path)?;
            log::info!("Reading POIs from {}", provider.path().display());
            Box::new(provider)
        }
        None => {
            log::warn!("No --osm extract given; POI distance features will be dropped");
            Box::new(MemoryPoiProvider::default())
        }
    };

    let renderer: Box<dyn ChartRenderer> = match charts {
        Some(path) => Box::new(JsonChartRenderer::new(File::create(path)?)),
        None => Box::new(LogChartRenderer),
    };

    let result = predict_price(
        &repository,
        provider.as_ref(),
        renderer.as_ref(),
        query,
        config,
    )?;
    repository.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let p = &result.prediction;
    println!("Estimated price: £{:.0}", p.mean);
    println!(
        "  mean interval:       £{:.0} to £{:.0}",
        p.mean_ci_lower, p.mean_ci_upper
    );
    println!(
        "  prediction interval: £{:.0} to £{:.0}",
        p.obs_ci_lower, p.obs_ci_upper
    );
    println!(
        "Model: R² {:.3}, RMSE £{:.0} ({} train / {} test rows, {} outliers dropped, {} rows excluded)",
        result.metrics.r_squared,
        result.metrics.rmse,
        result.metrics.n_train,
        result.metrics.n_test,
        result.dropped_outliers,
        result.excluded_rows
    );
    for (column, value) in &result.coefficients {
        println!("  {column:<36} {value:>14.4}");
    }
    for warning in &result.warnings {
        println!("Warning: {warning}");
    }

    Ok(())
}

fn run_nulls(db: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let repository = open_repository(db)?;
    let total = repository.count()?;
    println!("{total} rows");
    for (column, empty) in repository.column_empty_counts()? {
        println!("  {column:<20} {empty:>10}");
    }
    repository.close()?;
    Ok(())
}

fn run_pois(
    osm: &Path,
    latitude: f64,
    longitude: f64,
    bbox_km: f64,
    top: usize,
    filter: &PoiFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    let provider = OsmPbfProvider::new(osm)?;
    let bbox = BoundingBox::around_km(latitude, longitude, bbox_km)?;
    let pois = provider.pois_in_bbox(&bbox, filter)?;

    println!(
        "{} POIs within {bbox_km} km box of {}",
        pois.len(),
        provider.path().display()
    );
    for key in filter.keys() {
        println!("{key}:");
        for (value, count) in most_common_values(&pois, key, top) {
            println!("  {value:<24} {count:>6}");
        }
    }

    Ok(())
}
