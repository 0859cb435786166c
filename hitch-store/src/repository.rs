use async_trait::async_trait;
use uuid::Uuid;

use hitch_core::DispatchResult;
use hitch_trip::{Trip, TripChange};

/// Persistence seam for trips. The dispatch engine talks only to this trait,
/// so the in-memory and Postgres stores are interchangeable.
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn insert(&self, trip: &Trip) -> DispatchResult<()>;

    async fn get(&self, id: Uuid) -> DispatchResult<Option<Trip>>;

    /// Conditional transition. The change applies only while the stored
    /// status is one of `change.expected_from()`; the check and the write
    /// are atomic per trip, so of N concurrent callers at most one wins.
    /// Losers get the error from [`TripChange::reject_from`].
    async fn transition(&self, id: Uuid, change: TripChange) -> DispatchResult<Trip>;

    /// Latest trip the customer still has in flight, PENDING included.
    async fn active_for_customer(&self, customer_id: &str) -> DispatchResult<Option<Trip>>;

    /// Trip the driver is currently assigned to, if any.
    async fn active_for_driver(&self, driver_id: &str) -> DispatchResult<Option<Trip>>;

    /// Every trip the customer ever opened, newest first.
    async fn history_for_customer(&self, customer_id: &str) -> DispatchResult<Vec<Trip>>;

    /// All PENDING trips, oldest first. The expiry sweep uses this to adopt
    /// jobs a durable store still holds after a restart.
    async fn list_pending(&self) -> DispatchResult<Vec<Trip>>;
}
