use std::collections::HashSet;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use proj4rs::proj::Proj;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ErrorKind, StreamStatsResult};
use crate::source::PointSource;
use crate::types::{Crs, PointId, PointSeed};
use crate::{bail, ss_error};

const EARTH_RADIUS_M: f64 = 6_378_137.0;

const WGS84_DEFINITION: &str = "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs";

#[derive(Debug, Deserialize)]
struct FeatureCollectionDoc {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    crs: Option<CrsMember>,
    #[serde(default)]
    features: Vec<FeatureDoc>,
}

#[derive(Debug, Deserialize)]
struct CrsMember {
    properties: CrsProperties,
}

#[derive(Debug, Deserialize)]
struct CrsProperties {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FeatureDoc {
    #[serde(default)]
    geometry: Option<GeometryDoc>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeometryDoc {
    Point {
        coordinates: Vec<f64>,
    },
    MultiPoint {
        coordinates: Vec<Vec<f64>>,
    },
    #[serde(other)]
    Unsupported,
}

impl GeometryDoc {
    /// The point of the feature; multipoints contribute their first member.
    fn first_point(&self) -> Option<(f64, f64)> {
        let coordinates = match self {
            GeometryDoc::Point { coordinates } => coordinates.as_slice(),
            GeometryDoc::MultiPoint { coordinates } => coordinates.first()?.as_slice(),
            GeometryDoc::Unsupported => return None,
        };

        match coordinates {
            [x, y, ..] => Some((*x, *y)),
            _ => None,
        }
    }
}

/// Loads points from a GeoJSON `FeatureCollection`.
///
/// Each feature's identifier is read from the `unique_field` property. Features are deduplicated
/// by identifier keeping the first, and coordinates are reprojected to EPSG:4326. Point
/// identifiers passed to [`GeoJsonSource::with_ignored`] are skipped, which lets a run resume
/// after points already exported.
#[derive(Debug, Clone)]
pub struct GeoJsonSource {
    path: PathBuf,
    unique_field: String,
    region_code: String,
    ignored: HashSet<PointId>,
}

impl GeoJsonSource {
    pub fn new(
        path: impl Into<PathBuf>,
        unique_field: impl Into<String>,
        region_code: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            unique_field: unique_field.into(),
            region_code: region_code.into(),
            ignored: HashSet::new(),
        }
    }

    pub fn with_ignored(mut self, ids: impl IntoIterator<Item = PointId>) -> Self {
        self.ignored.extend(ids);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses a GeoJSON document into seeds.
    pub fn parse(&self, document: &str) -> StreamStatsResult<Vec<PointSeed>> {
        let collection: FeatureCollectionDoc = serde_json::from_str(document).map_err(|err| {
            ss_error!(
                ErrorKind::SourceLoadFailed,
                "Input is not valid GeoJSON",
                format!("{}: {err}", self.path.display()),
                source: err
            )
        })?;

        if collection.kind != "FeatureCollection" {
            bail!(
                ErrorKind::SourceLoadFailed,
                "Input must be a GeoJSON FeatureCollection",
                format!("{} has type `{}`", self.path.display(), collection.kind)
            );
        }

        let source_crs = match &collection.crs {
            Some(member) => Crs::parse(&member.properties.name).ok_or_else(|| {
                ss_error!(
                    ErrorKind::UnsupportedCrs,
                    "Input coordinate reference system is not recognized",
                    member.properties.name.clone()
                )
            })?,
            None => Crs::WGS84,
        };
        let reprojection = Reprojection::to_wgs84(source_crs)?;

        let mut seen = HashSet::new();
        let mut seeds = Vec::with_capacity(collection.features.len());
        let mut ignored = 0usize;

        for (index, feature) in collection.features.iter().enumerate() {
            let Some(id) = feature
                .properties
                .as_ref()
                .and_then(|properties| properties.get(&self.unique_field))
                .and_then(identifier)
            else {
                warn!(index, field = %self.unique_field, "feature has no identifier, skipping");
                continue;
            };

            let Some((x, y)) = feature.geometry.as_ref().and_then(GeometryDoc::first_point) else {
                warn!(%id, "feature has no point geometry, skipping");
                continue;
            };

            if !seen.insert(id.clone()) {
                warn!(%id, "duplicate identifier, keeping the first occurrence");
                continue;
            }

            if self.ignored.contains(&id) {
                ignored += 1;
                continue;
            }

            let (x, y) = match reprojection.apply(x, y) {
                Ok(position) => position,
                Err(err) => {
                    warn!(%id, error = %err, "feature could not be reprojected, skipping");
                    continue;
                }
            };
            seeds.push(PointSeed {
                id,
                x,
                y,
                crs: Crs::WGS84,
                region_code: self.region_code.clone(),
            });
        }

        info!(
            path = %self.path.display(),
            points = seeds.len(),
            ignored,
            source_crs = %source_crs,
            "loaded input points"
        );

        Ok(seeds)
    }
}

impl PointSource for GeoJsonSource {
    fn name() -> &'static str {
        "geojson"
    }

    async fn load(&self) -> StreamStatsResult<Vec<PointSeed>> {
        let document = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            ss_error!(
                ErrorKind::SourceLoadFailed,
                "Failed to read input file",
                format!("{}: {err}", self.path.display()),
                source: err
            )
        })?;

        self.parse(&document)
    }
}

/// Renders string or numeric identifiers as text.
fn identifier(value: &Value) -> Option<PointId> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(PointId::new(text.trim())),
        Value::Number(number) => Some(PointId::new(number.to_string())),
        _ => None,
    }
}

/// Transformation of source coordinates into EPSG:4326 longitude/latitude degrees.
enum Reprojection {
    Unchanged,
    WebMercator,
    Definition {
        from: Proj,
        to: Proj,
        geographic: bool,
    },
}

impl Reprojection {
    /// Resolves the EPSG definition of `crs`.
    fn to_wgs84(crs: Crs) -> StreamStatsResult<Self> {
        match crs {
            Crs::WGS84 => return Ok(Reprojection::Unchanged),
            Crs::WEB_MERCATOR => return Ok(Reprojection::WebMercator),
            _ => {}
        }

        let Some(definition) = u16::try_from(crs.code())
            .ok()
            .and_then(crs_definitions::from_code)
        else {
            bail!(
                ErrorKind::UnsupportedCrs,
                "Input coordinate reference system cannot be reprojected",
                format!("{crs} has no known definition")
            );
        };

        let from = Proj::from_proj_string(definition.proj4).map_err(|err| {
            ss_error!(
                ErrorKind::UnsupportedCrs,
                "Input coordinate reference system cannot be reprojected",
                format!("{crs}: {err}")
            )
        })?;
        let to = Proj::from_proj_string(WGS84_DEFINITION).map_err(|err| {
            ss_error!(
                ErrorKind::InvalidState,
                "Working coordinate reference system is invalid",
                format!("{err}")
            )
        })?;

        Ok(Reprojection::Definition {
            from,
            to,
            geographic: definition.proj4.contains("+proj=longlat"),
        })
    }

    fn apply(&self, x: f64, y: f64) -> StreamStatsResult<(f64, f64)> {
        match self {
            Reprojection::Unchanged => Ok((x, y)),
            Reprojection::WebMercator => Ok(web_mercator_to_wgs84(x, y)),
            Reprojection::Definition {
                from,
                to,
                geographic,
            } => {
                // Geographic coordinates go through proj4rs in radians.
                let mut point = if *geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };
                proj4rs::transform::transform(from, to, &mut point).map_err(|err| {
                    ss_error!(
                        ErrorKind::UnsupportedCrs,
                        "Coordinates cannot be reprojected",
                        format!("({x}, {y}): {err}")
                    )
                })?;

                let (lon, lat) = (point.0.to_degrees(), point.1.to_degrees());
                if !lon.is_finite() || !lat.is_finite() {
                    bail!(
                        ErrorKind::UnsupportedCrs,
                        "Coordinates cannot be reprojected",
                        format!("({x}, {y}) is outside the projection")
                    );
                }

                Ok((lon, lat))
            }
        }
    }
}

fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn source() -> GeoJsonSource {
        GeoJsonSource::new("points.geojson", "UID", "VT")
    }

    #[test]
    fn duplicates_keep_first_and_multipoints_use_first_member() {
        let document = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"UID": "a"},
                 "geometry": {"type": "Point", "coordinates": [-72.5, 44.1]}},
                {"type": "Feature", "properties": {"UID": "a"},
                 "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}},
                {"type": "Feature", "properties": {"UID": 7},
                 "geometry": {"type": "MultiPoint", "coordinates": [[-72.0, 44.0], [-71.0, 43.0]]}},
                {"type": "Feature", "properties": {"OTHER": "x"},
                 "geometry": {"type": "Point", "coordinates": [1.0, 1.0]}},
                {"type": "Feature", "properties": {"UID": "line"},
                 "geometry": {"type": "LineString", "coordinates": [[1.0, 1.0], [2.0, 2.0]]}}
            ]
        })
        .to_string();

        let seeds = source().parse(&document).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0], PointSeed::new("a", -72.5, 44.1, "VT"));
        assert_eq!(seeds[1].id.as_str(), "7");
        assert_eq!((seeds[1].x, seeds[1].y), (-72.0, 44.0));
    }

    #[test]
    fn web_mercator_input_is_reprojected() {
        let document = json!({
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}},
            "features": [
                {"type": "Feature", "properties": {"UID": "a"},
                 "geometry": {"type": "Point", "coordinates": [-8070000.0, 5480000.0]}}
            ]
        })
        .to_string();

        let seeds = source().parse(&document).unwrap();
        assert!((seeds[0].x - -72.494).abs() < 1e-3, "lon was {}", seeds[0].x);
        assert!((seeds[0].y - 44.094).abs() < 1e-3, "lat was {}", seeds[0].y);
        assert_eq!(seeds[0].crs, Crs::WGS84);
    }

    #[test]
    fn state_plane_input_is_reprojected() {
        let document = json!({
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32145"}},
            "features": [
                {"type": "Feature", "properties": {"UID": "a"},
                 "geometry": {"type": "Point", "coordinates": [480000.0, 150000.0]}}
            ]
        })
        .to_string();

        let seeds = source().parse(&document).unwrap();
        assert!((seeds[0].x - -72.748740).abs() < 1e-4, "lon was {}", seeds[0].x);
        assert!((seeds[0].y - 43.849959).abs() < 1e-4, "lat was {}", seeds[0].y);
        assert_eq!(seeds[0].crs, Crs::WGS84);
    }

    #[test]
    fn utm_input_is_reprojected() {
        let document = json!({
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "EPSG:26918"}},
            "features": [
                {"type": "Feature", "properties": {"UID": "a"},
                 "geometry": {"type": "Point", "coordinates": [680000.0, 4900000.0]}}
            ]
        })
        .to_string();

        let seeds = source().parse(&document).unwrap();
        assert!((seeds[0].x - -72.746140).abs() < 1e-4, "lon was {}", seeds[0].x);
        assert!((seeds[0].y - 44.230998).abs() < 1e-4, "lat was {}", seeds[0].y);
    }

    #[test]
    fn unresolvable_crs_is_fatal() {
        for name in ["EPSG:1", "EPSG:4000000"] {
            let document = json!({
                "type": "FeatureCollection",
                "crs": {"type": "name", "properties": {"name": name}},
                "features": []
            })
            .to_string();

            let err = source().parse(&document).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedCrs, "{name}");
        }
    }

    #[test]
    fn ignored_ids_are_skipped() {
        let document = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"UID": "a"},
                 "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}},
                {"type": "Feature", "properties": {"UID": "b"},
                 "geometry": {"type": "Point", "coordinates": [3.0, 4.0]}}
            ]
        })
        .to_string();

        let seeds = source()
            .with_ignored([PointId::new("a")])
            .parse(&document)
            .unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].id.as_str(), "b");
    }

    #[test]
    fn non_collections_are_rejected() {
        let err = source()
            .parse(r#"{"type": "Feature", "features": []}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceLoadFailed);
    }

    #[tokio::test]
    async fn missing_file_is_a_load_failure() {
        let err = GeoJsonSource::new("/nonexistent/points.geojson", "UID", "VT")
            .load()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceLoadFailed);
    }
}
