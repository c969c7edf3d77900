//! Geographic primitives: points, geotags, great-circle distance.

use serde::{Deserialize, Serialize};

use super::error::{CoreError, InvalidCoordinate};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 point. Validated at construction - out-of-range coordinates
/// are unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoreError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(InvalidCoordinate {
                field: "latitude",
                value: lat,
                min: -90.0,
                max: 90.0,
            }
            .into());
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(InvalidCoordinate {
                field: "longitude",
                value: lon,
                min: -180.0,
                max: 180.0,
            }
            .into());
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

/// A captured device fix: point plus horizontal accuracy radius in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geotag {
    pub point: GeoPoint,
    pub accuracy_m: f64,
}

impl Geotag {
    pub fn new(point: GeoPoint, accuracy_m: f64) -> Self {
        Self { point, accuracy_m }
    }
}

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}
