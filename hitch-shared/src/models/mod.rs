pub mod events;

use serde::{Deserialize, Serialize};

/// Kind of job a driver can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Ride,
    Tow,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Ride => "RIDE",
            ServiceType::Tow => "TOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RIDE" => Some(ServiceType::Ride),
            "TOW" => Some(ServiceType::Tow),
            _ => None,
        }
    }
}

/// Bare coordinate pair, WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A named place on the map as the customer picked it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// What a driver is currently driving, as shown on customer and admin screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSnapshot {
    pub plate: String,
    pub model: String,
    pub color: String,
}
