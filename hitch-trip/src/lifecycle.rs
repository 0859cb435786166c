//! Guarded transitions for the trip state machine.
//!
//! A [`TripChange`] names the edge a caller wants to take. Stores apply a
//! change only while the current status is in `expected_from`; the check and
//! the write happen under one lock or one conditional UPDATE, which is what
//! makes the accept race safe.

use chrono::{DateTime, Utc};

use crate::models::{CancelActor, Trip, TripStatus};
use hitch_core::DispatchError;

#[derive(Debug, Clone)]
pub enum TripChange {
    Accept { driver_id: String },
    Start,
    Complete {
        final_distance_km: Option<f64>,
        final_price_cents: Option<i64>,
    },
    Cancel {
        by: CancelActor,
        reason: Option<String>,
    },
}

impl TripChange {
    /// Status this change moves the trip into.
    pub fn target(&self) -> TripStatus {
        match self {
            TripChange::Accept { .. } => TripStatus::Accepted,
            TripChange::Start => TripStatus::InProgress,
            TripChange::Complete { .. } => TripStatus::Completed,
            TripChange::Cancel { .. } => TripStatus::Cancelled,
        }
    }

    /// Statuses the trip must currently hold for this change to apply.
    ///
    /// A system cancel only ever fires for jobs nobody took, so it is pinned
    /// to PENDING; if a driver accepted while the expiry sweep was running,
    /// the sweep loses instead of killing a live trip.
    pub fn expected_from(&self) -> &'static [TripStatus] {
        match self {
            TripChange::Accept { .. } => &[TripStatus::Pending],
            TripChange::Start => &[TripStatus::Accepted],
            TripChange::Complete { .. } => &[TripStatus::InProgress],
            TripChange::Cancel {
                by: CancelActor::System,
                ..
            } => &[TripStatus::Pending],
            TripChange::Cancel { .. } => &[
                TripStatus::Pending,
                TripStatus::Accepted,
                TripStatus::InProgress,
            ],
        }
    }

    /// Mutate the trip for this change. Caller has already checked the
    /// status precondition.
    pub fn apply(&self, trip: &mut Trip, now: DateTime<Utc>) {
        trip.status = self.target();
        match self {
            TripChange::Accept { driver_id } => {
                trip.driver_id = Some(driver_id.clone());
                trip.accepted_at = Some(now);
            }
            TripChange::Start => {
                trip.started_at = Some(now);
            }
            TripChange::Complete {
                final_distance_km,
                final_price_cents,
            } => {
                if let Some(distance) = final_distance_km {
                    trip.distance_km = *distance;
                }
                if let Some(price) = final_price_cents {
                    trip.price_cents = *price;
                }
                trip.completed_at = Some(now);
            }
            TripChange::Cancel { by, reason } => {
                // A cancelled trip holds no assignment; cancelled_by and the
                // timestamps keep the history.
                trip.driver_id = None;
                trip.cancelled_by = Some(*by);
                trip.cancel_reason = reason.clone();
                trip.cancelled_at = Some(now);
            }
        }
    }

    /// Diagnose a failed status precondition into the error a caller sees.
    ///
    /// Terminal trips can never move again. A trip already sitting in the
    /// target status means somebody else won the same transition first.
    pub fn reject_from(&self, current: TripStatus) -> DispatchError {
        if current.is_terminal() {
            DispatchError::InvalidTransition {
                from: current.as_str().to_string(),
                to: self.target().as_str().to_string(),
            }
        } else if current == self.target() {
            DispatchError::StaleState
        } else {
            DispatchError::InvalidTransition {
                from: current.as_str().to_string(),
                to: self.target().as_str().to_string(),
            }
        }
    }
}
