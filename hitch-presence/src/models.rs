use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hitch_shared::models::events::{DriverSnapshotPayload, LiveLocation};
use hitch_shared::{GeoPoint, ServiceType, VehicleSnapshot};

/// Last reported position of a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverLocation {
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub speed: f64,
    pub updated_at: DateTime<Utc>,
}

/// Volatile availability record for one driver. Rebuilt from connects and
/// location pings after a restart, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverPresence {
    pub driver_id: String,
    pub online: bool,
    pub location: Option<DriverLocation>,
    pub vehicle: Option<VehicleSnapshot>,
    pub capabilities: Vec<ServiceType>,
    pub current_trip_id: Option<Uuid>,
    pub last_seen: DateTime<Utc>,
}

impl DriverPresence {
    pub fn new(driver_id: String) -> Self {
        Self {
            driver_id,
            online: true,
            location: None,
            vehicle: None,
            capabilities: Vec::new(),
            current_trip_id: None,
            last_seen: Utc::now(),
        }
    }

    /// A driver with no declared capabilities serves nothing.
    pub fn can_serve(&self, service: ServiceType) -> bool {
        self.capabilities.contains(&service)
    }

    /// Silent drivers are treated as implicitly offline.
    pub fn is_fresh(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        now.signed_duration_since(self.last_seen) <= staleness
    }

    /// Eligible to receive a new job offer right now.
    pub fn is_dispatchable(&self, service: ServiceType, now: DateTime<Utc>, staleness: Duration) -> bool {
        self.online
            && self.current_trip_id.is_none()
            && self.can_serve(service)
            && self.is_fresh(now, staleness)
    }

    pub fn point(&self) -> Option<GeoPoint> {
        self.location.as_ref().map(|l| GeoPoint {
            lat: l.lat,
            lng: l.lng,
        })
    }
}

impl From<&DriverLocation> for LiveLocation {
    fn from(loc: &DriverLocation) -> Self {
        LiveLocation {
            lat: loc.lat,
            lng: loc.lng,
            heading: loc.heading,
            speed: loc.speed,
            updated_at: loc.updated_at,
        }
    }
}

impl From<&DriverPresence> for DriverSnapshotPayload {
    fn from(p: &DriverPresence) -> Self {
        DriverSnapshotPayload {
            driver_id: p.driver_id.clone(),
            online: p.online,
            location: p.location.as_ref().map(LiveLocation::from),
            vehicle: p.vehicle.clone(),
            capabilities: p.capabilities.clone(),
            current_trip_id: p.current_trip_id,
            last_seen: p.last_seen,
        }
    }
}
