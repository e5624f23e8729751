//! Reference boundary polygons.
//!
//! The spatial filter asks a [`BoundaryResolver`] for the administrative boundary of a place
//! once per run. [`NominatimResolver`] asks OpenStreetMap's Nominatim service;
//! [`GeoJsonFileResolver`] reads a boundary saved to disk; [`StaticBoundary`] hands out a
//! boundary that is already in memory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use geo::{Coord, Intersects, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::types::LatLon;

pub const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

/// A place's boundary in longitude/latitude coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub place: String,
    pub shape: MultiPolygon<f64>,
}

impl Boundary {
    pub fn new(place: impl Into<String>, shape: MultiPolygon<f64>) -> Self {
        Self {
            place: place.into(),
            shape,
        }
    }

    /// Whether `point` lies inside or on the boundary.
    pub fn contains(&self, point: LatLon) -> bool {
        self.shape.intersects(&point.to_point())
    }

    /// Build a boundary from GeoJSON: a bare `Polygon`/`MultiPolygon` geometry, a `Feature`, or
    /// the first feature of a `FeatureCollection`.
    pub fn from_geojson(place: &str, value: &serde_json::Value) -> PipelineResult<Self> {
        let geocode_err = |message: String| PipelineError::Geocode {
            place: place.to_owned(),
            message,
        };

        let geometry = match value.get("type").and_then(|t| t.as_str()) {
            Some("FeatureCollection") => value
                .get("features")
                .and_then(|f| f.get(0))
                .and_then(|f| f.get("geometry")),
            Some("Feature") => value.get("geometry"),
            _ => Some(value),
        }
        .ok_or_else(|| geocode_err("geojson has no geometry".to_string()))?;

        let geometry = GeoJsonGeometry::deserialize(geometry)
            .map_err(|e| geocode_err(format!("invalid geojson geometry: {e}")))?;
        let shape = geometry.into_multi_polygon().map_err(geocode_err)?;
        Ok(Self::new(place, shape))
    }
}

/// Resolves a free-text place name to its boundary.
pub trait BoundaryResolver {
    fn resolve(&self, place: &str) -> PipelineResult<Boundary>;
}

/// Boundary lookup against a Nominatim search endpoint. The first result is authoritative.
#[derive(Debug, Clone)]
pub struct NominatimResolver {
    client: reqwest::blocking::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    geojson: Option<serde_json::Value>,
}

impl NominatimResolver {
    pub fn new(timeout: Duration) -> PipelineResult<Self> {
        Self::with_endpoint(NOMINATIM_SEARCH_URL, timeout)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::config(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl BoundaryResolver for NominatimResolver {
    fn resolve(&self, place: &str) -> PipelineResult<Boundary> {
        let geocode_err = |message: String| PipelineError::Geocode {
            place: place.to_owned(),
            message,
        };

        let places: Vec<NominatimPlace> = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", place),
                ("format", "json"),
                ("polygon_geojson", "1"),
                ("limit", "1"),
            ])
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| geocode_err(e.to_string()))?;

        let first = places
            .into_iter()
            .next()
            .ok_or_else(|| geocode_err("no results".to_string()))?;
        debug!(place, matched = ?first.display_name, "boundary resolved");

        let geojson = first
            .geojson
            .ok_or_else(|| geocode_err("result has no geometry".to_string()))?;
        Boundary::from_geojson(place, &geojson)
    }
}

/// Reads the boundary from a GeoJSON file, whatever place is asked for.
#[derive(Debug, Clone)]
pub struct GeoJsonFileResolver {
    path: PathBuf,
}

impl GeoJsonFileResolver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl BoundaryResolver for GeoJsonFileResolver {
    fn resolve(&self, place: &str) -> PipelineResult<Boundary> {
        let text = fs::read_to_string(&self.path)?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| PipelineError::Geocode {
                place: place.to_owned(),
                message: format!("{}: {e}", self.path.display()),
            })?;
        Boundary::from_geojson(place, &value)
    }
}

/// A boundary that is already known.
#[derive(Debug, Clone)]
pub struct StaticBoundary(pub Boundary);

impl BoundaryResolver for StaticBoundary {
    fn resolve(&self, _place: &str) -> PipelineResult<Boundary> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct GeoJsonGeometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: serde_json::Value,
}

type Ring = Vec<Vec<f64>>;

impl GeoJsonGeometry {
    fn into_multi_polygon(self) -> Result<MultiPolygon<f64>, String> {
        let bad = |e: serde_json::Error| format!("invalid {} coordinates: {e}", self.kind);
        match self.kind.as_str() {
            "Polygon" => {
                let rings: Vec<Ring> = serde_json::from_value(self.coordinates.clone()).map_err(bad)?;
                Ok(MultiPolygon::new(vec![polygon(rings)?]))
            }
            "MultiPolygon" => {
                let polygons: Vec<Vec<Ring>> =
                    serde_json::from_value(self.coordinates.clone()).map_err(bad)?;
                let polygons = polygons.into_iter().map(polygon).collect::<Result<_, _>>()?;
                Ok(MultiPolygon::new(polygons))
            }
            other => Err(format!("expected a Polygon or MultiPolygon, got {other}")),
        }
    }
}

fn polygon(rings: Vec<Ring>) -> Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter().map(line_string);
    let exterior = rings.next().ok_or("polygon has no rings")??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn line_string(ring: Ring) -> Result<LineString<f64>, String> {
    ring.into_iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(format!("position {position:?} needs two coordinates")),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::from)
}
