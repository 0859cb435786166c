//! Wire envelopes for the realtime gateway.
//!
//! Every socket frame is a JSON object `{"event": "...", "data": {...}}`.
//! Server-to-client frames are [`ServerEvent`], client-to-server frames are
//! [`ClientEvent`]. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Location, ServiceType, VehicleSnapshot};

/// Client-facing projection of a trip record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    pub id: Uuid,
    pub customer_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub service_type: ServiceType,
    pub vehicle_model: String,
    pub price_cents: i64,
    pub distance_km: f64,
    pub additional_services: Vec<String>,
    pub status: String,
    pub driver_id: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Offer round pushed to candidate drivers. Clients derive their countdown
/// from `offerCreatedAt`/`offerExpiresAt` rather than trusting local timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequestPayload {
    pub trip: TripSummary,
    pub round: u32,
    pub offer_created_at: DateTime<Utc>,
    pub offer_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTakenPayload {
    pub trip_id: Uuid,
    pub driver_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCancelledPayload {
    pub trip: TripSummary,
    pub cancelled_by: String,
    pub reason: Option<String>,
}

/// High-frequency position tick for one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationPayload {
    pub driver_id: String,
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub speed: f64,
    pub updated_at: DateTime<Utc>,
    pub current_trip_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverDisconnectedPayload {
    pub driver_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveLocation {
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub speed: f64,
    pub updated_at: DateTime<Utc>,
}

/// One entry of the fleet snapshot sent to admins on connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSnapshotPayload {
    pub driver_id: String,
    pub online: bool,
    pub location: Option<LiveLocation>,
    pub vehicle: Option<VehicleSnapshot>,
    pub capabilities: Vec<ServiceType>,
    pub current_trip_id: Option<Uuid>,
    pub last_seen: DateTime<Utc>,
}

/// Error reply for a socket action, mirrored from the REST error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFailedPayload {
    pub trip_id: Option<Uuid>,
    pub code: String,
    pub message: String,
}

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewJobRequest(JobRequestPayload),
    JobTaken(JobTakenPayload),
    DriverAccepted(TripSummary),
    TripStarted(TripSummary),
    TripCompleted(TripSummary),
    TripUpdated(TripSummary),
    JobCancelled(JobCancelledPayload),
    DriverLocationUpdated(DriverLocationPayload),
    DriverDisconnected(DriverDisconnectedPayload),
    AllDriverLocations(Vec<DriverSnapshotPayload>),
    ActionFailed(ActionFailedPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoOnlinePayload {
    pub vehicle: VehicleSnapshot,
    pub capabilities: Vec<ServiceType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdatePayload {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripActionPayload {
    pub trip_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTripPayload {
    pub trip_id: Uuid,
    pub final_distance_km: Option<f64>,
    pub final_price_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTripPayload {
    pub trip_id: Uuid,
    pub reason: Option<String>,
}

/// Frames accepted from clients. Driver-only actions are enforced by the
/// gateway against the connection's role tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    GoOnline(GoOnlinePayload),
    GoOffline,
    UpdateLocation(LocationUpdatePayload),
    AcceptJob(TripActionPayload),
    StartTrip(TripActionPayload),
    CompleteTrip(CompleteTripPayload),
    CancelTrip(CancelTripPayload),
}
