//! Spherical distance queries over tour start locations.

use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::{ApiError, ApiResult};
use crate::query::{Document, ID_FIELD};
use crate::resources::schema::point_coordinates;

pub const EARTH_RADIUS_MILES: f64 = 3963.2;
pub const EARTH_RADIUS_KM: f64 = 6378.1;
const EARTH_RADIUS_METERS: f64 = EARTH_RADIUS_KM * 1000.0;

const METERS_TO_MILES: f64 = 0.000621371;
const METERS_TO_KM: f64 = 0.001;

const CENTER_FORMAT: &str = "Please provide latitude and longitude in the format: lat,lng";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Kilometers,
}

impl DistanceUnit {
    /// `mi` means miles; anything else is kilometres.
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == "mi" {
            DistanceUnit::Miles
        } else {
            DistanceUnit::Kilometers
        }
    }

    fn earth_radius(self) -> f64 {
        match self {
            DistanceUnit::Miles => EARTH_RADIUS_MILES,
            DistanceUnit::Kilometers => EARTH_RADIUS_KM,
        }
    }

    fn per_meter(self) -> f64 {
        match self {
            DistanceUnit::Miles => METERS_TO_MILES,
            DistanceUnit::Kilometers => METERS_TO_KM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Parse `lat,lng`.
    pub fn parse(raw: &str) -> ApiResult<Self> {
        let mut parts = raw.split(',').map(str::trim);
        let lat = parts.next().and_then(|part| part.parse::<f64>().ok());
        let lng = parts.next().and_then(|part| part.parse::<f64>().ok());
        match (lat, lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Ok(Self { lat, lng }),
            _ => Err(ApiError::BadRequest(CENTER_FORMAT.to_string())),
        }
    }
}

/// Central angle in radians between two points (haversine).
pub fn central_angle(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

fn start_of(document: &Document) -> Option<LatLng> {
    let (lng, lat) = point_coordinates(document.get("startLocation")?)?;
    Some(LatLng { lat, lng })
}

/// Tours whose start lies within `distance` units of `center`. Tours without a
/// start location never match.
pub fn within(tours: Vec<Document>, center: LatLng, distance: f64, unit: DistanceUnit) -> Vec<Document> {
    let radius = distance / unit.earth_radius();
    tours
        .into_iter()
        .filter(|tour| start_of(tour).is_some_and(|start| central_angle(center, start) <= radius))
        .collect()
}

#[derive(Debug, Clone, Serialize, schemars::JsonSchema)]
pub struct TourDistance {
    pub id: i64,
    pub name: Option<String>,
    pub distance: f64,
}

/// Distance from `center` to every tour start, nearest first.
pub fn distances(tours: &[Document], center: LatLng, unit: DistanceUnit) -> Vec<TourDistance> {
    let mut distances: Vec<TourDistance> = tours
        .iter()
        .filter_map(|tour| {
            let start = start_of(tour)?;
            let meters = central_angle(center, start) * EARTH_RADIUS_METERS;
            Some(TourDistance {
                id: tour.get(ID_FIELD).and_then(Value::as_i64)?,
                name: tour.get("name").and_then(Value::as_str).map(str::to_string),
                distance: meters * unit.per_meter(),
            })
        })
        .collect();
    distances.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
    distances
}
