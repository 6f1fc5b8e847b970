//! `OpenStreetMap` PBF point-of-interest provider.
//!
//! Tagged nodes become POIs directly. Tagged ways (school grounds, parks)
//! need a second pass over the file to resolve their member node
//! positions; the way is then reported at the centroid of those nodes.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use osmpbf::{Element, ElementReader};
use pricepaid_property_models::{BoundingBox, PoiFilter, PointOfInterest};

use crate::{PoiError, PoiProvider};

/// Reads points of interest from an OSM `.pbf` extract on every query.
#[derive(Debug, Clone)]
pub struct OsmPbfProvider {
    path: PathBuf,
}

impl OsmPbfProvider {
    /// # Errors
    ///
    /// Returns [`PoiError::FileNotFound`] if `path` does not exist.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PoiError> {
        let path = path.into();
        if !path.exists() {
            return Err(PoiError::FileNotFound(path.display().to_string()));
        }
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<ElementReader<std::io::BufReader<std::fs::File>>, PoiError> {
        ElementReader::from_path(&self.path).map_err(|e| self.parse_error(&e))
    }

    fn parse_error(&self, e: &osmpbf::Error) -> PoiError {
        PoiError::Parse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }
}

/// A tagged way whose coordinates are resolved in the second pass.
#[derive(Debug, Clone)]
struct PendingWay {
    tags: Vec<(String, String)>,
    refs: Vec<i64>,
}

#[derive(Debug, Default)]
struct FirstPass {
    pois: Vec<PointOfInterest>,
    ways: Vec<PendingWay>,
}

impl FirstPass {
    fn merge(mut self, mut other: Self) -> Self {
        self.pois.append(&mut other.pois);
        self.ways.append(&mut other.ways);
        self
    }
}

impl PoiProvider for OsmPbfProvider {
    fn pois_in_bbox(
        &self,
        bbox: &BoundingBox,
        filter: &PoiFilter,
    ) -> Result<Vec<PointOfInterest>, PoiError> {
        bbox.validate()?;

        log::info!("Scanning OSM PBF for POIs: {}", self.path.display());

        let first = self
            .reader()?
            .par_map_reduce(
                |element| {
                    let mut pass = FirstPass::default();
                    match element {
                        Element::Node(node) => pass.pois.extend(pois_from_tags(
                            node.tags(),
                            node.lat(),
                            node.lon(),
                            bbox,
                            filter,
                        )),
                        Element::DenseNode(node) => pass.pois.extend(pois_from_tags(
                            node.tags(),
                            node.lat(),
                            node.lon(),
                            bbox,
                            filter,
                        )),
                        Element::Way(way) => {
                            let tags = matching_tags(way.tags(), filter);
                            if !tags.is_empty() {
                                pass.ways.push(PendingWay {
                                    tags,
                                    refs: way.refs().collect(),
                                });
                            }
                        }
                        Element::Relation(_) => {}
                    }
                    pass
                },
                FirstPass::default,
                FirstPass::merge,
            )
            .map_err(|e| self.parse_error(&e))?;

        let mut pois = first.pois;
        let node_pois = pois.len();

        if !first.ways.is_empty() {
            let wanted: HashSet<i64> = first
                .ways
                .iter()
                .flat_map(|w| w.refs.iter().copied())
                .collect();
            let positions = self.node_positions(&wanted)?;

            for way in &first.ways {
                let Some((lat, lon)) = centroid(&way.refs, &positions) else {
                    continue;
                };
                if !bbox.contains(lat, lon) {
                    continue;
                }
                pois.extend(way.tags.iter().map(|(key, value)| PointOfInterest {
                    category_key: key.clone(),
                    category_value: value.clone(),
                    latitude: lat,
                    longitude: lon,
                }));
            }
        }

        // Parallel decoding returns blocks in arbitrary order.
        pois.sort_by(|a, b| {
            a.category_key
                .cmp(&b.category_key)
                .then_with(|| a.category_value.cmp(&b.category_value))
                .then_with(|| a.latitude.total_cmp(&b.latitude))
                .then_with(|| a.longitude.total_cmp(&b.longitude))
        });

        log::info!(
            "Found {} POIs in bbox ({node_pois} nodes, {} from ways)",
            pois.len(),
            pois.len() - node_pois
        );

        Ok(pois)
    }
}

impl OsmPbfProvider {
    fn node_positions(&self, wanted: &HashSet<i64>) -> Result<HashMap<i64, (f64, f64)>, PoiError> {
        self.reader()?
            .par_map_reduce(
                |element| {
                    let mut found = HashMap::new();
                    match element {
                        Element::Node(node) if wanted.contains(&node.id()) => {
                            found.insert(node.id(), (node.lat(), node.lon()));
                        }
                        Element::DenseNode(node) if wanted.contains(&node.id()) => {
                            found.insert(node.id(), (node.lat(), node.lon()));
                        }
                        _ => {}
                    }
                    found
                },
                HashMap::new,
                |mut a, b| {
                    a.extend(b);
                    a
                },
            )
            .map_err(|e| self.parse_error(&e))
    }
}

/// Returns the requested `(key, value)` tag pairs carried by an element.
fn matching_tags<'a>(
    tags: impl Iterator<Item = (&'a str, &'a str)>,
    filter: &PoiFilter,
) -> Vec<(String, String)> {
    tags.filter(|(key, value)| filter.matches(key, value))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// One POI per requested tag on a node inside the box.
fn pois_from_tags<'a>(
    tags: impl Iterator<Item = (&'a str, &'a str)>,
    lat: f64,
    lon: f64,
    bbox: &BoundingBox,
    filter: &PoiFilter,
) -> Vec<PointOfInterest> {
    if !lat.is_finite() || !lon.is_finite() || !bbox.contains(lat, lon) {
        return Vec::new();
    }

    matching_tags(tags, filter)
        .into_iter()
        .map(|(key, value)| PointOfInterest {
            category_key: key,
            category_value: value,
            latitude: lat,
            longitude: lon,
        })
        .collect()
}

/// Mean position of the resolved member nodes. Closed ways repeat their
/// first node at the end; the duplicate is skipped.
#[allow(clippy::cast_precision_loss)]
fn centroid(refs: &[i64], positions: &HashMap<i64, (f64, f64)>) -> Option<(f64, f64)> {
    let refs = match refs {
        [first, rest @ .., last] if first == last && !rest.is_empty() => &refs[..refs.len() - 1],
        _ => refs,
    };

    let (count, lat_sum, lon_sum) = refs
        .iter()
        .filter_map(|id| positions.get(id))
        .fold((0_usize, 0.0, 0.0), |(n, lat, lon), (y, x)| {
            (n + 1, lat + y, lon + x)
        });

    (count > 0).then(|| (lat_sum / count as f64, lon_sum / count as f64))
}
