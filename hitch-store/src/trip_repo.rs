//! Postgres trip store.
//!
//! Transitions are single conditional UPDATE statements guarded by
//! `status = ANY(expected)`, so the row-level lock inside Postgres decides
//! races. Zero updated rows means the precondition failed; a follow-up read
//! only diagnoses which error to return.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use hitch_core::{DispatchError, DispatchResult};
use hitch_shared::{Location, ServiceType};
use hitch_trip::{CancelActor, Trip, TripChange, TripStatus};

use crate::repository::TripRepository;

const TRIP_COLUMNS: &str = "id, customer_id, pickup_address, pickup_lat, pickup_lng, \
    dropoff_address, dropoff_lat, dropoff_lng, service_type, vehicle_model, price_cents, \
    distance_km, additional_services, status, driver_id, cancelled_by, cancel_reason, \
    created_at, accepted_at, started_at, completed_at, cancelled_at";

pub struct PgTripRepository {
    pool: PgPool,
}

impl PgTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    customer_id: String,
    pickup_address: String,
    pickup_lat: f64,
    pickup_lng: f64,
    dropoff_address: String,
    dropoff_lat: f64,
    dropoff_lng: f64,
    service_type: String,
    vehicle_model: String,
    price_cents: i64,
    distance_km: f64,
    additional_services: Vec<String>,
    status: String,
    driver_id: Option<String>,
    cancelled_by: Option<String>,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TripRow {
    fn into_trip(self) -> DispatchResult<Trip> {
        let status = TripStatus::parse(&self.status)
            .ok_or_else(|| DispatchError::Store(format!("corrupt status {:?} for trip {}", self.status, self.id)))?;
        let service_type = ServiceType::parse(&self.service_type)
            .ok_or_else(|| DispatchError::Store(format!("corrupt service type {:?} for trip {}", self.service_type, self.id)))?;
        let cancelled_by = match self.cancelled_by {
            None => None,
            Some(raw) => Some(CancelActor::parse(&raw).ok_or_else(|| {
                DispatchError::Store(format!("corrupt cancel actor {:?} for trip {}", raw, self.id))
            })?),
        };

        Ok(Trip {
            id: self.id,
            customer_id: self.customer_id,
            pickup: Location {
                address: self.pickup_address,
                lat: self.pickup_lat,
                lng: self.pickup_lng,
            },
            dropoff: Location {
                address: self.dropoff_address,
                lat: self.dropoff_lat,
                lng: self.dropoff_lng,
            },
            service_type,
            vehicle_model: self.vehicle_model,
            price_cents: self.price_cents,
            distance_km: self.distance_km,
            additional_services: self.additional_services,
            status,
            driver_id: self.driver_id,
            cancelled_by,
            cancel_reason: self.cancel_reason,
            created_at: self.created_at,
            accepted_at: self.accepted_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            cancelled_at: self.cancelled_at,
        })
    }
}

fn store_error(err: sqlx::Error) -> DispatchError {
    DispatchError::Store(err.to_string())
}

#[async_trait]
impl TripRepository for PgTripRepository {
    async fn insert(&self, trip: &Trip) -> DispatchResult<()> {
        sqlx::query(
            "INSERT INTO trips (id, customer_id, pickup_address, pickup_lat, pickup_lng, \
             dropoff_address, dropoff_lat, dropoff_lng, service_type, vehicle_model, price_cents, \
             distance_km, additional_services, status, driver_id, cancelled_by, cancel_reason, \
             created_at, accepted_at, started_at, completed_at, cancelled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21, $22)",
        )
        .bind(trip.id)
        .bind(&trip.customer_id)
        .bind(&trip.pickup.address)
        .bind(trip.pickup.lat)
        .bind(trip.pickup.lng)
        .bind(&trip.dropoff.address)
        .bind(trip.dropoff.lat)
        .bind(trip.dropoff.lng)
        .bind(trip.service_type.as_str())
        .bind(&trip.vehicle_model)
        .bind(trip.price_cents)
        .bind(trip.distance_km)
        .bind(&trip.additional_services)
        .bind(trip.status.as_str())
        .bind(trip.driver_id.as_deref())
        .bind(trip.cancelled_by.map(|a| a.as_str()))
        .bind(trip.cancel_reason.as_deref())
        .bind(trip.created_at)
        .bind(trip.accepted_at)
        .bind(trip.started_at)
        .bind(trip.completed_at)
        .bind(trip.cancelled_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DispatchResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE id = $1",
            TRIP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => Ok(Some(row.into_trip()?)),
            None => Ok(None),
        }
    }

    async fn transition(&self, id: Uuid, change: TripChange) -> DispatchResult<Trip> {
        let now = Utc::now();
        let expected: Vec<String> = change
            .expected_from()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let updated = match &change {
            TripChange::Accept { driver_id } => {
                sqlx::query_as::<_, TripRow>(&format!(
                    "UPDATE trips SET status = 'ACCEPTED', driver_id = $2, accepted_at = $3 \
                     WHERE id = $1 AND status = ANY($4) RETURNING {}",
                    TRIP_COLUMNS
                ))
                .bind(id)
                .bind(driver_id.as_str())
                .bind(now)
                .bind(&expected)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?
            }
            TripChange::Start => {
                sqlx::query_as::<_, TripRow>(&format!(
                    "UPDATE trips SET status = 'IN_PROGRESS', started_at = $2 \
                     WHERE id = $1 AND status = ANY($3) RETURNING {}",
                    TRIP_COLUMNS
                ))
                .bind(id)
                .bind(now)
                .bind(&expected)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?
            }
            TripChange::Complete {
                final_distance_km,
                final_price_cents,
            } => {
                sqlx::query_as::<_, TripRow>(&format!(
                    "UPDATE trips SET status = 'COMPLETED', completed_at = $2, \
                     distance_km = COALESCE($3, distance_km), \
                     price_cents = COALESCE($4, price_cents) \
                     WHERE id = $1 AND status = ANY($5) RETURNING {}",
                    TRIP_COLUMNS
                ))
                .bind(id)
                .bind(now)
                .bind(final_distance_km)
                .bind(final_price_cents)
                .bind(&expected)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?
            }
            TripChange::Cancel { by, reason } => {
                sqlx::query_as::<_, TripRow>(&format!(
                    "UPDATE trips SET status = 'CANCELLED', driver_id = NULL, cancelled_at = $2, \
                     cancelled_by = $3, cancel_reason = $4 \
                     WHERE id = $1 AND status = ANY($5) RETURNING {}",
                    TRIP_COLUMNS
                ))
                .bind(id)
                .bind(now)
                .bind(by.as_str())
                .bind(reason.as_deref())
                .bind(&expected)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?
            }
        };

        if let Some(row) = updated {
            return row.into_trip();
        }

        // Zero rows: somebody else moved the trip first, or it never existed.
        let current = sqlx::query_scalar::<_, String>("SELECT status FROM trips WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        match current {
            None => Err(DispatchError::NotFound(format!("trip {}", id))),
            Some(raw) => {
                let status = TripStatus::parse(&raw).ok_or_else(|| {
                    DispatchError::Store(format!("corrupt status {:?} for trip {}", raw, id))
                })?;
                Err(change.reject_from(status))
            }
        }
    }

    async fn active_for_customer(&self, customer_id: &str) -> DispatchResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE customer_id = $1 \
             AND status IN ('PENDING', 'ACCEPTED', 'IN_PROGRESS') \
             ORDER BY created_at DESC LIMIT 1",
            TRIP_COLUMNS
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => Ok(Some(row.into_trip()?)),
            None => Ok(None),
        }
    }

    async fn active_for_driver(&self, driver_id: &str) -> DispatchResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE driver_id = $1 \
             AND status IN ('ACCEPTED', 'IN_PROGRESS') \
             ORDER BY created_at DESC LIMIT 1",
            TRIP_COLUMNS
        ))
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => Ok(Some(row.into_trip()?)),
            None => Ok(None),
        }
    }

    async fn history_for_customer(&self, customer_id: &str) -> DispatchResult<Vec<Trip>> {
        let rows = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE customer_id = $1 ORDER BY created_at DESC",
            TRIP_COLUMNS
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(TripRow::into_trip).collect()
    }

    async fn list_pending(&self) -> DispatchResult<Vec<Trip>> {
        let rows = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {} FROM trips WHERE status = 'PENDING' ORDER BY created_at",
            TRIP_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(TripRow::into_trip).collect()
    }
}
