//! Region boundaries and the in-memory spatial index.
//!
//! Regions are polygons with a specificity kind (neighborhood > district
//! > city). They may overlap, so point lookups return every containing
//! region ordered by descending specificity. The index is built once at
//! startup from GeoJSON boundaries and shared across all consumers.

use geo::{BoundingRect, Contains, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::Coordinates;

/// How specific a region boundary is. Higher specificity wins when a
/// point falls inside multiple overlapping regions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RegionKind {
    /// City-wide boundary (least specific).
    City,
    /// Administrative district within a city.
    District,
    /// Neighborhood boundary (most specific).
    Neighborhood,
}

impl RegionKind {
    /// Numeric specificity — higher values are more specific.
    #[must_use]
    pub const fn specificity(self) -> u8 {
        match self {
            Self::City => 1,
            Self::District => 2,
            Self::Neighborhood => 3,
        }
    }
}

/// A region boundary with its metadata.
#[derive(Debug, Clone)]
pub struct Region {
    /// Unique region identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Boundary specificity kind.
    pub kind: RegionKind,
    /// Boundary polygon(s).
    pub boundary: MultiPolygon<f64>,
}

/// Error raised when a region boundary cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// The GeoJSON string was malformed.
    #[error("invalid GeoJSON for region {region_id}: {message}")]
    InvalidGeoJson {
        /// Region whose boundary failed to parse.
        region_id: String,
        /// Description of the parse failure.
        message: String,
    },
}

impl Region {
    /// Builds a region from a GeoJSON geometry string.
    ///
    /// Accepts both `Polygon` and `MultiPolygon` geometries.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::InvalidGeoJson`] if the string is not a
    /// polygonal GeoJSON geometry.
    pub fn from_geojson(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: RegionKind,
        geojson_str: &str,
    ) -> Result<Self, RegionError> {
        let id = id.into();
        let boundary =
            parse_geojson_to_multipolygon(geojson_str).ok_or_else(|| RegionError::InvalidGeoJson {
                region_id: id.clone(),
                message: "expected a Polygon or MultiPolygon geometry".to_string(),
            })?;

        Ok(Self {
            id,
            name: name.into(),
            kind,
            boundary,
        })
    }
}

/// A region stored in the R-tree with its precomputed envelope.
struct RegionEntry {
    region: Region,
    envelope: AABB<[f64; 2]>,
    envelope_area: f64,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over region boundaries.
///
/// Constructed once and shared across all consumers. Provides fast
/// point-in-polygon lookups with overlap resolution by specificity.
pub struct RegionIndex {
    regions: RTree<RegionEntry>,
    len: usize,
}

impl RegionIndex {
    /// Builds the index from a set of regions.
    #[must_use]
    pub fn new(regions: Vec<Region>) -> Self {
        let len = regions.len();
        let entries = regions
            .into_iter()
            .map(|region| {
                let envelope = compute_envelope(&region.boundary);
                let envelope_area = envelope_area(&envelope);
                RegionEntry {
                    region,
                    envelope,
                    envelope_area,
                }
            })
            .collect();

        log::info!("Loaded {len} regions into spatial index");

        Self {
            regions: RTree::bulk_load(entries),
            len,
        }
    }

    /// Number of indexed regions.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the index holds no regions.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns every region containing the point, most specific first.
    ///
    /// Overlaps at equal specificity are ordered by smaller bounding
    /// envelope, then lexical id, so the order is deterministic.
    #[must_use]
    pub fn locate(&self, coords: Coordinates) -> Vec<&Region> {
        let point = geo::Point::new(coords.longitude, coords.latitude);
        let query_env = AABB::from_point([coords.longitude, coords.latitude]);

        let mut matches: Vec<&RegionEntry> = self
            .regions
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.region.boundary.contains(&point))
            .collect();

        matches.sort_by(|a, b| {
            b.region
                .kind
                .specificity()
                .cmp(&a.region.kind.specificity())
                .then_with(|| a.envelope_area.total_cmp(&b.envelope_area))
                .then_with(|| a.region.id.cmp(&b.region.id))
        });

        matches.into_iter().map(|entry| &entry.region).collect()
    }

    /// Returns the most specific region containing the point, if any.
    #[must_use]
    pub fn locate_most_specific(&self, coords: Coordinates) -> Option<&Region> {
        self.locate(coords).into_iter().next()
    }
}

/// Parses a GeoJSON `FeatureCollection` into regions.
///
/// Each feature must carry `id`, `name`, and `kind` properties (kind in
/// SCREAMING_SNAKE_CASE) and a polygonal geometry. This is the loader
/// for region boundary files supplied at deployment time.
///
/// # Errors
///
/// Returns [`RegionError::InvalidGeoJson`] if the collection or any
/// feature in it is malformed.
pub fn regions_from_feature_collection(geojson_str: &str) -> Result<Vec<Region>, RegionError> {
    let invalid = |region_id: &str, message: &str| RegionError::InvalidGeoJson {
        region_id: region_id.to_string(),
        message: message.to_string(),
    };

    let geojson: GeoJson = geojson_str
        .parse()
        .map_err(|e| invalid("<collection>", &format!("not valid GeoJSON: {e}")))?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(invalid("<collection>", "expected a FeatureCollection"));
    };

    collection
        .features
        .into_iter()
        .map(|feature| {
            let id = feature
                .property("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| invalid("<feature>", "missing 'id' property"))?
                .to_string();
            let name = feature
                .property("name")
                .and_then(|v| v.as_str())
                .unwrap_or(&id)
                .to_string();
            let kind = feature
                .property("kind")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| invalid(&id, "missing or unknown 'kind' property"))?;

            let geometry = feature
                .geometry
                .ok_or_else(|| invalid(&id, "missing geometry"))?;
            let geo_geom: geo::Geometry<f64> = geometry
                .try_into()
                .map_err(|_| invalid(&id, "geometry is not convertible"))?;
            let boundary = match geo_geom {
                geo::Geometry::MultiPolygon(mp) => mp,
                geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
                _ => return Err(invalid(&id, "expected a Polygon or MultiPolygon geometry")),
            };

            Ok(Region {
                id,
                name,
                kind,
                boundary,
            })
        })
        .collect()
}

/// Parse a GeoJSON string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        let geo_geom: geo::Geometry<f64> = geom.try_into().ok()?;
        match geo_geom {
            geo::Geometry::MultiPolygon(mp) => Some(mp),
            geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
            _ => None,
        }
    } else {
        None
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

fn envelope_area(env: &AABB<[f64; 2]>) -> f64 {
    let lower = env.lower();
    let upper = env.upper();
    (upper[0] - lower[0]) * (upper[1] - lower[1])
}
