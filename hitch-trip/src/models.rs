use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hitch_core::{DispatchError, DispatchResult};
use hitch_shared::models::events::TripSummary;
use hitch_shared::{Location, ServiceType};

/// Trip status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// Completed and cancelled trips never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Pending => "PENDING",
            TripStatus::Accepted => "ACCEPTED",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TripStatus::Pending),
            "ACCEPTED" => Some(TripStatus::Accepted),
            "IN_PROGRESS" => Some(TripStatus::InProgress),
            "COMPLETED" => Some(TripStatus::Completed),
            "CANCELLED" => Some(TripStatus::Cancelled),
            _ => None,
        }
    }
}

/// Which party ended a trip early.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelActor {
    Customer,
    Driver,
    System,
}

impl CancelActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelActor::Customer => "CUSTOMER",
            CancelActor::Driver => "DRIVER",
            CancelActor::System => "SYSTEM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CUSTOMER" => Some(CancelActor::Customer),
            "DRIVER" => Some(CancelActor::Driver),
            "SYSTEM" => Some(CancelActor::System),
            _ => None,
        }
    }
}

/// The single source of truth for one ride or tow job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub customer_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub service_type: ServiceType,
    pub vehicle_model: String,
    pub price_cents: i64,
    pub distance_km: f64,
    pub additional_services: Vec<String>,
    pub status: TripStatus,
    pub driver_id: Option<String>,
    pub cancelled_by: Option<CancelActor>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Trip {
    pub fn new(req: NewTrip) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id: req.customer_id,
            pickup: req.pickup,
            dropoff: req.dropoff,
            service_type: req.service_type,
            vehicle_model: req.vehicle_model,
            price_cents: req.price_cents,
            distance_km: req.distance_km,
            additional_services: req.additional_services,
            status: TripStatus::Pending,
            driver_id: None,
            cancelled_by: None,
            cancel_reason: None,
            created_at: Utc::now(),
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    pub fn summary(&self) -> TripSummary {
        TripSummary::from(self)
    }
}

impl From<&Trip> for TripSummary {
    fn from(trip: &Trip) -> Self {
        TripSummary {
            id: trip.id,
            customer_id: trip.customer_id.clone(),
            pickup: trip.pickup.clone(),
            dropoff: trip.dropoff.clone(),
            service_type: trip.service_type,
            vehicle_model: trip.vehicle_model.clone(),
            price_cents: trip.price_cents,
            distance_km: trip.distance_km,
            additional_services: trip.additional_services.clone(),
            status: trip.status.as_str().to_string(),
            driver_id: trip.driver_id.clone(),
            cancelled_by: trip.cancelled_by.map(|a| a.as_str().to_string()),
            cancel_reason: trip.cancel_reason.clone(),
            created_at: trip.created_at,
            accepted_at: trip.accepted_at,
            started_at: trip.started_at,
            completed_at: trip.completed_at,
            cancelled_at: trip.cancelled_at,
        }
    }
}

/// Input for opening a trip, as posted by a customer.
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub customer_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub service_type: ServiceType,
    pub vehicle_model: String,
    pub price_cents: i64,
    pub distance_km: f64,
    pub additional_services: Vec<String>,
}

impl NewTrip {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.customer_id.trim().is_empty() {
            return Err(DispatchError::Validation("customerId is required".to_string()));
        }
        if self.vehicle_model.trim().is_empty() {
            return Err(DispatchError::Validation("vehicleModel is required".to_string()));
        }
        validate_location("pickup", &self.pickup)?;
        validate_location("dropoff", &self.dropoff)?;
        if self.price_cents < 0 {
            return Err(DispatchError::Validation("price must not be negative".to_string()));
        }
        if !self.distance_km.is_finite() || self.distance_km < 0.0 {
            return Err(DispatchError::Validation("distance must be a non-negative number".to_string()));
        }
        Ok(())
    }
}

fn validate_location(field: &str, loc: &Location) -> DispatchResult<()> {
    if loc.address.trim().is_empty() {
        return Err(DispatchError::Validation(format!("{} address is required", field)));
    }
    if !(-90.0..=90.0).contains(&loc.lat) || !(-180.0..=180.0).contains(&loc.lng) {
        return Err(DispatchError::Validation(format!("{} coordinates are out of range", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> NewTrip {
        NewTrip {
            customer_id: "C1".to_string(),
            pickup: Location {
                address: "Peace Avenue 17".to_string(),
                lat: 47.9187,
                lng: 106.9177,
            },
            dropoff: Location {
                address: "Airport Road 1".to_string(),
                lat: 47.8431,
                lng: 106.7666,
            },
            service_type: ServiceType::Tow,
            vehicle_model: "Prius 30".to_string(),
            price_cents: 80_000,
            distance_km: 14.2,
            additional_services: vec!["WINCH".to_string()],
        }
    }

    #[test]
    fn test_new_trip_starts_pending_and_unassigned() {
        let trip = Trip::new(sample_request());
        assert_eq!(trip.status, TripStatus::Pending);
        assert!(trip.driver_id.is_none());
        assert!(trip.accepted_at.is_none());
        assert_eq!(trip.summary().status, "PENDING");
    }

    #[test]
    fn test_validation_rejects_bad_coordinates() {
        let mut req = sample_request();
        req.pickup.lat = 91.0;
        let err = req.validate().unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn test_validation_rejects_blank_fields() {
        let mut req = sample_request();
        req.customer_id = "  ".to_string();
        assert!(req.validate().is_err());

        let mut req = sample_request();
        req.dropoff.address = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_price() {
        let mut req = sample_request();
        req.price_cents = -1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            TripStatus::Pending,
            TripStatus::Accepted,
            TripStatus::InProgress,
            TripStatus::Completed,
            TripStatus::Cancelled,
        ] {
            assert_eq!(TripStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TripStatus::parse("DISPATCHED"), None);
    }
}
