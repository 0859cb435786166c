use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use hitch_core::DispatchError;
use hitch_dispatch::Canceller;
use hitch_shared::models::events::TripSummary;
use hitch_shared::{Location, ServiceType};
use hitch_trip::{CancelActor, NewTrip};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTripRequest {
    pub customer_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub service_type: ServiceType,
    pub vehicle_model: String,
    pub price_cents: i64,
    pub distance_km: f64,
    #[serde(default)]
    pub additional_services: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptTripRequest {
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTripRequest {
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTripRequest {
    pub driver_id: String,
    pub final_distance_km: Option<f64>,
    pub final_price_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTripRequest {
    pub cancelled_by: String,
    pub actor_id: String,
    pub reason: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips", post(create_trip))
        .route("/v1/trips/{id}", get(get_trip))
        .route("/v1/trips/{id}/accept", post(accept_trip))
        .route("/v1/trips/{id}/start", post(start_trip))
        .route("/v1/trips/{id}/complete", post(complete_trip))
        .route("/v1/trips/{id}/cancel", post(cancel_trip))
        .route("/v1/customers/{id}/trips/active", get(customer_active_trip))
        .route("/v1/customers/{id}/trips", get(customer_trip_history))
        .route("/v1/drivers/{id}/trips/active", get(driver_active_trip))
}

/// POST /v1/trips
/// Open a trip and broadcast it to eligible drivers.
async fn create_trip(
    State(state): State<AppState>,
    Json(req): Json<CreateTripRequest>,
) -> Result<Json<TripSummary>, ApiError> {
    let trip = state
        .engine
        .create_trip(NewTrip {
            customer_id: req.customer_id,
            pickup: req.pickup,
            dropoff: req.dropoff,
            service_type: req.service_type,
            vehicle_model: req.vehicle_model,
            price_cents: req.price_cents,
            distance_km: req.distance_km,
            additional_services: req.additional_services,
        })
        .await?;
    Ok(Json(trip.summary()))
}

/// GET /v1/trips/{id}
async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<TripSummary>, ApiError> {
    let trip = state
        .trips
        .get(trip_id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("trip {}", trip_id)))?;
    Ok(Json(trip.summary()))
}

/// POST /v1/trips/{id}/accept
async fn accept_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<AcceptTripRequest>,
) -> Result<Json<TripSummary>, ApiError> {
    let trip = state.engine.accept(trip_id, &req.driver_id).await?;
    Ok(Json(trip.summary()))
}

/// POST /v1/trips/{id}/start
async fn start_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<StartTripRequest>,
) -> Result<Json<TripSummary>, ApiError> {
    let trip = state.engine.start(trip_id, &req.driver_id).await?;
    Ok(Json(trip.summary()))
}

/// POST /v1/trips/{id}/complete
async fn complete_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<CompleteTripRequest>,
) -> Result<Json<TripSummary>, ApiError> {
    let trip = state
        .engine
        .complete(trip_id, &req.driver_id, req.final_distance_km, req.final_price_cents)
        .await?;
    Ok(Json(trip.summary()))
}

/// POST /v1/trips/{id}/cancel
/// Cancels on behalf of the trip's customer or its assigned driver. System
/// cancellations come from the expiry sweep, never from this endpoint.
async fn cancel_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<CancelTripRequest>,
) -> Result<Json<TripSummary>, ApiError> {
    let canceller = match CancelActor::parse(&req.cancelled_by) {
        Some(CancelActor::Customer) => Canceller::Customer {
            id: req.actor_id,
            reason: req.reason,
        },
        Some(CancelActor::Driver) => Canceller::Driver {
            id: req.actor_id,
            reason: req.reason,
        },
        _ => {
            return Err(DispatchError::Validation(
                "cancelledBy must be CUSTOMER or DRIVER".to_string(),
            )
            .into())
        }
    };
    let trip = state.engine.cancel(trip_id, canceller).await?;
    Ok(Json(trip.summary()))
}

/// GET /v1/customers/{id}/trips/active
/// The customer's current trip, if any, for app-restart reconciliation.
async fn customer_active_trip(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<Option<TripSummary>>, ApiError> {
    let trip = state.trips.active_for_customer(&customer_id).await?;
    Ok(Json(trip.map(|t| t.summary())))
}

/// GET /v1/customers/{id}/trips
/// Past trips, newest first.
async fn customer_trip_history(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<TripSummary>>, ApiError> {
    let trips = state.trips.history_for_customer(&customer_id).await?;
    Ok(Json(trips.iter().map(|t| t.summary()).collect()))
}

/// GET /v1/drivers/{id}/trips/active
async fn driver_active_trip(
    State(state): State<AppState>,
    Path(driver_id): Path<String>,
) -> Result<Json<Option<TripSummary>>, ApiError> {
    let trip = state.trips.active_for_driver(&driver_id).await?;
    Ok(Json(trip.map(|t| t.summary())))
}
