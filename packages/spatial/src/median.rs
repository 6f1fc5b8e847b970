//! Locally smoothed prices: the median sale price of each property's
//! nearest neighbors.

use geo::Point;

use crate::{GeoIndex, SpatialError};

/// Neighbors used per property when no `k` is configured.
pub const DEFAULT_K: usize = 10;

/// A location with an optional price. Unpriced points (the property being
/// valued) take a neighbor slot but contribute no price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedPoint {
    pub location: Point<f64>,
    pub price: Option<f64>,
}

/// Median price of each sample's `k + 1` nearest samples, itself included.
///
/// `k` is clamped to `n - 1`, so a sparse window never errors. The result
/// is aligned with `samples`; an entry is `None` only when none of the
/// neighbors has a price.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidInput`] if `samples` is empty, `k` is
/// zero, or a location is non-finite.
pub fn local_median(samples: &[PricedPoint], k: usize) -> Result<Vec<Option<f64>>, SpatialError> {
    if samples.is_empty() {
        return Err(SpatialError::invalid(
            "cannot compute local medians for an empty sample",
        ));
    }
    if k == 0 {
        return Err(SpatialError::invalid("k must be at least 1"));
    }

    let effective_k = k.min(samples.len() - 1);
    if effective_k < k {
        log::debug!(
            "Clamping local median k from {k} to {effective_k} for {} samples",
            samples.len()
        );
    }

    let locations: Vec<Point<f64>> = samples.iter().map(|s| s.location).collect();
    let index = GeoIndex::build(&locations)?;
    let neighborhoods = index.query(&locations, effective_k + 1)?;

    Ok(neighborhoods
        .iter()
        .map(|neighbors| {
            let mut prices: Vec<f64> = neighbors
                .iter()
                .filter_map(|n| samples[n.index].price)
                .collect();
            median(&mut prices)
        })
        .collect())
}

/// Median of a slice, averaging the two middle values for even lengths.
/// Sorts the slice in place.
#[must_use]
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(f64::midpoint(values[mid - 1], values[mid]))
    } else {
        Some(values[mid])
    }
}
