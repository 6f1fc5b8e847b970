//! k-nearest-neighbor index ranked by haversine distance.
//!
//! Points are stored in an R-tree as unit-sphere cartesian vectors. Chord
//! length is monotone in great-circle distance, so the R-tree's Euclidean
//! ordering matches haversine ordering; reported distances are haversine
//! metres.

use geo::Point;
use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::{SpatialError, check_finite, haversine_distance};

type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// One result of a k-nearest query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the neighbor in the point slice the index was built from.
    pub index: usize,
    /// Haversine distance in metres.
    pub distance_m: f64,
}

/// Spatial index over a fixed point set.
pub struct GeoIndex {
    tree: RTree<IndexedPoint>,
    points: Vec<Point<f64>>,
}

impl GeoIndex {
    /// Builds an index over `points`. Positions in the slice become the
    /// neighbor indices returned by [`Self::query`].
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidInput`] if any point has non-finite
    /// coordinates.
    pub fn build(points: &[Point<f64>]) -> Result<Self, SpatialError> {
        check_finite(points)?;

        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new(to_unit_vector(*p), i))
            .collect();

        Ok(Self {
            tree: RTree::bulk_load(entries),
            points: points.to_vec(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the `k` nearest indexed points for each query point, ordered
    /// by ascending distance with ties broken by insertion order.
    ///
    /// `k` is clamped to the number of indexed points. A query point that is
    /// also indexed finds itself at distance 0.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidInput`] if the index is empty, `k` is
    /// zero, or a query point has non-finite coordinates.
    pub fn query(
        &self,
        points: &[Point<f64>],
        k: usize,
    ) -> Result<Vec<Vec<Neighbor>>, SpatialError> {
        if self.is_empty() {
            return Err(SpatialError::invalid("cannot query an empty index"));
        }
        if k == 0 {
            return Err(SpatialError::invalid("k must be at least 1"));
        }
        check_finite(points)?;

        let k = k.min(self.len());

        Ok(points.iter().map(|p| self.nearest(*p, k)).collect())
    }

    fn nearest(&self, point: Point<f64>, k: usize) -> Vec<Neighbor> {
        let target = to_unit_vector(point);
        let mut candidates = Vec::with_capacity(k + 1);
        let mut cutoff: Option<f64> = None;

        // Keep pulling past the k-th neighbor while distances tie with it,
        // so equidistant points can be ordered by insertion index below.
        for (entry, distance_2) in self.tree.nearest_neighbor_iter_with_distance_2(&target) {
            if cutoff.is_some_and(|limit| distance_2 > limit) {
                break;
            }
            candidates.push(Neighbor {
                index: entry.data,
                distance_m: haversine_distance(point, self.points[entry.data]),
            });
            if cutoff.is_none() && candidates.len() == k {
                cutoff = Some(distance_2);
            }
        }

        candidates.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then(a.index.cmp(&b.index))
        });
        candidates.truncate(k);
        candidates
    }
}

fn to_unit_vector(point: Point<f64>) -> [f64; 3] {
    let lat = point.y().to_radians();
    let lon = point.x().to_radians();
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}
