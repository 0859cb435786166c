//! In-memory driver presence registry.
//!
//! One record per driver, keyed by driver id. Location writes are
//! last-write-wins; the record survives reconnects so an accepted trip stays
//! linked to its driver across a dropped socket.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use hitch_core::geo;
use hitch_core::{DispatchError, DispatchResult};
use hitch_shared::{GeoPoint, ServiceType, VehicleSnapshot};

use crate::models::{DriverLocation, DriverPresence};

pub struct PresenceRegistry {
    drivers: RwLock<HashMap<String, DriverPresence>>,
    staleness: Duration,
}

impl PresenceRegistry {
    pub fn new(staleness: Duration) -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            staleness,
        }
    }

    /// Record a driver socket connecting. Capabilities arrive later with
    /// `set_online`, so a freshly connected driver is not yet a candidate.
    pub async fn connect(&self, driver_id: &str) {
        let mut drivers = self.drivers.write().await;
        let entry = drivers
            .entry(driver_id.to_string())
            .or_insert_with(|| DriverPresence::new(driver_id.to_string()));
        entry.online = true;
        entry.last_seen = Utc::now();
        tracing::debug!(driver_id, "driver connected");
    }

    /// Driver declared itself on shift with a vehicle and capabilities.
    pub async fn set_online(
        &self,
        driver_id: &str,
        vehicle: VehicleSnapshot,
        capabilities: Vec<ServiceType>,
    ) {
        let mut drivers = self.drivers.write().await;
        let entry = drivers
            .entry(driver_id.to_string())
            .or_insert_with(|| DriverPresence::new(driver_id.to_string()));
        entry.online = true;
        entry.vehicle = Some(vehicle);
        entry.capabilities = capabilities;
        entry.last_seen = Utc::now();
    }

    /// Driver went off shift or its socket dropped. The record is kept:
    /// `current_trip_id` must survive a disconnect so the trip linkage
    /// invariant holds while the trip is still live in the store.
    pub async fn set_offline(&self, driver_id: &str) {
        let mut drivers = self.drivers.write().await;
        if let Some(entry) = drivers.get_mut(driver_id) {
            entry.online = false;
            entry.last_seen = Utc::now();
            tracing::debug!(driver_id, "driver offline");
        }
    }

    /// Last-write-wins position update. Unknown drivers are upserted since a
    /// ping proves liveness.
    pub async fn update_location(&self, driver_id: &str, location: DriverLocation) -> DriverPresence {
        let mut drivers = self.drivers.write().await;
        let entry = drivers
            .entry(driver_id.to_string())
            .or_insert_with(|| DriverPresence::new(driver_id.to_string()));
        entry.last_seen = location.updated_at;
        entry.location = Some(location);
        entry.clone()
    }

    pub async fn get(&self, driver_id: &str) -> Option<DriverPresence> {
        self.drivers.read().await.get(driver_id).cloned()
    }

    /// Claim a driver for a trip. Eligibility check and the busy flip happen
    /// under one write lock, so two concurrent claims for the same driver
    /// cannot both succeed, even for different trips.
    pub async fn try_reserve(
        &self,
        driver_id: &str,
        trip_id: Uuid,
        service: ServiceType,
    ) -> DispatchResult<()> {
        let mut drivers = self.drivers.write().await;
        let entry = drivers
            .get_mut(driver_id)
            .ok_or(DispatchError::DriverUnavailable)?;
        if !entry.online || entry.current_trip_id.is_some() || !entry.can_serve(service) {
            return Err(DispatchError::DriverUnavailable);
        }
        entry.current_trip_id = Some(trip_id);
        Ok(())
    }

    /// Undo a reservation whose trip transition did not go through. Only
    /// clears the link if it still points at the given trip.
    pub async fn release(&self, driver_id: &str, trip_id: Uuid) {
        let mut drivers = self.drivers.write().await;
        if let Some(entry) = drivers.get_mut(driver_id) {
            if entry.current_trip_id == Some(trip_id) {
                entry.current_trip_id = None;
            }
        }
    }

    /// Unlink a finished trip. Tolerates drivers that already disconnected.
    pub async fn clear_trip(&self, driver_id: &str) {
        let mut drivers = self.drivers.write().await;
        if let Some(entry) = drivers.get_mut(driver_id) {
            entry.current_trip_id = None;
        }
    }

    /// Drivers eligible for a new offer: online, free, capable and fresh.
    /// With a pickup point and radius configured, also inside the geofence.
    pub async fn candidates(
        &self,
        service: ServiceType,
        near: Option<&GeoPoint>,
        radius_km: Option<f64>,
    ) -> Vec<DriverPresence> {
        let now = Utc::now();
        let drivers = self.drivers.read().await;
        drivers
            .values()
            .filter(|d| d.is_dispatchable(service, now, self.staleness))
            .filter(|d| match (near, radius_km) {
                (Some(center), Some(radius)) => d
                    .point()
                    .map(|p| geo::within_radius(center, &p, radius))
                    .unwrap_or(false),
                _ => true,
            })
            .cloned()
            .collect()
    }

    /// Full fleet view for admin consoles.
    pub async fn snapshot(&self) -> Vec<DriverPresence> {
        self.drivers.read().await.values().cloned().collect()
    }
}
