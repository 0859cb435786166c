//! HashMap-backed trip store for development and tests.
//!
//! All conditional transitions run under one mutex, which is the in-memory
//! analog of the single-row conditional UPDATE in the Postgres store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use hitch_core::{DispatchError, DispatchResult};
use hitch_trip::{Trip, TripChange, TripStatus};

use crate::repository::TripRepository;

pub struct InMemoryTripRepository {
    trips: Mutex<HashMap<Uuid, Trip>>,
}

impl InMemoryTripRepository {
    pub fn new() -> Self {
        Self {
            trips: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTripRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TripRepository for InMemoryTripRepository {
    async fn insert(&self, trip: &Trip) -> DispatchResult<()> {
        let mut trips = self.trips.lock().await;
        trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DispatchResult<Option<Trip>> {
        let trips = self.trips.lock().await;
        Ok(trips.get(&id).cloned())
    }

    async fn transition(&self, id: Uuid, change: TripChange) -> DispatchResult<Trip> {
        let mut trips = self.trips.lock().await;
        let trip = trips
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound(format!("trip {}", id)))?;

        if !change.expected_from().contains(&trip.status) {
            return Err(change.reject_from(trip.status));
        }

        change.apply(trip, Utc::now());
        Ok(trip.clone())
    }

    async fn active_for_customer(&self, customer_id: &str) -> DispatchResult<Option<Trip>> {
        let trips = self.trips.lock().await;
        Ok(trips
            .values()
            .filter(|t| t.customer_id == customer_id && !t.status.is_terminal())
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn active_for_driver(&self, driver_id: &str) -> DispatchResult<Option<Trip>> {
        let trips = self.trips.lock().await;
        Ok(trips
            .values()
            .filter(|t| {
                t.driver_id.as_deref() == Some(driver_id)
                    && matches!(t.status, TripStatus::Accepted | TripStatus::InProgress)
            })
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn history_for_customer(&self, customer_id: &str) -> DispatchResult<Vec<Trip>> {
        let trips = self.trips.lock().await;
        let mut history: Vec<Trip> = trips
            .values()
            .filter(|t| t.customer_id == customer_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }

    async fn list_pending(&self) -> DispatchResult<Vec<Trip>> {
        let trips = self.trips.lock().await;
        let mut pending: Vec<Trip> = trips
            .values()
            .filter(|t| t.status == TripStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.created_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hitch_shared::{Location, ServiceType};
    use hitch_trip::{CancelActor, NewTrip};

    fn new_trip(customer_id: &str) -> Trip {
        Trip::new(NewTrip {
            customer_id: customer_id.to_string(),
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
            service_type: ServiceType::Ride,
            vehicle_model: "Prius 30".to_string(),
            price_cents: 42_000,
            distance_km: 14.2,
            additional_services: vec![],
        })
    }

    fn accept(driver: &str) -> TripChange {
        TripChange::Accept {
            driver_id: driver.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let repo = InMemoryTripRepository::new();
        let trip = new_trip("C1");
        repo.insert(&trip).await.unwrap();

        let stored = repo.get(trip.id).await.unwrap().unwrap();
        assert_eq!(stored.id, trip.id);
        assert_eq!(stored.status, TripStatus::Pending);
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_accept_transition_sets_driver() {
        let repo = InMemoryTripRepository::new();
        let trip = new_trip("C1");
        repo.insert(&trip).await.unwrap();

        let updated = repo.transition(trip.id, accept("D1")).await.unwrap();
        assert_eq!(updated.status, TripStatus::Accepted);
        assert_eq!(updated.driver_id.as_deref(), Some("D1"));
        assert!(updated.accepted_at.unwrap() >= updated.created_at);
    }

    #[tokio::test]
    async fn test_second_accept_loses_with_stale_state() {
        let repo = InMemoryTripRepository::new();
        let trip = new_trip("C1");
        repo.insert(&trip).await.unwrap();

        repo.transition(trip.id, accept("D1")).await.unwrap();
        let err = repo.transition(trip.id, accept("D2")).await.unwrap_err();
        assert!(matches!(err, DispatchError::StaleState));

        // The first writer's assignment is untouched.
        let stored = repo.get(trip.id).await.unwrap().unwrap();
        assert_eq!(stored.driver_id.as_deref(), Some("D1"));
    }

    #[tokio::test]
    async fn test_out_of_order_transition_rejected() {
        let repo = InMemoryTripRepository::new();
        let trip = new_trip("C1");
        repo.insert(&trip).await.unwrap();

        let err = repo.transition(trip.id, TripChange::Start).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_terminal_trip_cannot_move() {
        let repo = InMemoryTripRepository::new();
        let trip = new_trip("C1");
        repo.insert(&trip).await.unwrap();
        repo.transition(
            trip.id,
            TripChange::Cancel {
                by: CancelActor::Customer,
                reason: None,
            },
        )
        .await
        .unwrap();

        let err = repo.transition(trip.id, accept("D1")).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_transition_unknown_trip_is_not_found() {
        let repo = InMemoryTripRepository::new();
        let err = repo.transition(Uuid::new_v4(), accept("D1")).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_have_exactly_one_winner() {
        let repo = Arc::new(InMemoryTripRepository::new());
        let trip = new_trip("C1");
        repo.insert(&trip).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = Arc::clone(&repo);
            let trip_id = trip.id;
            handles.push(tokio::spawn(async move {
                repo.transition(trip_id, accept(&format!("D{}", i))).await
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(updated) => winners.push(updated.driver_id.unwrap()),
                Err(err) => assert!(matches!(err, DispatchError::StaleState)),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = repo.get(trip.id).await.unwrap().unwrap();
        assert_eq!(stored.driver_id.as_deref(), Some(winners[0].as_str()));
    }

    #[tokio::test]
    async fn test_active_queries_follow_assignment() {
        let repo = InMemoryTripRepository::new();
        let trip = new_trip("C1");
        repo.insert(&trip).await.unwrap();

        // A pending trip is active for its customer but belongs to no driver.
        assert!(repo.active_for_customer("C1").await.unwrap().is_some());
        assert!(repo.active_for_driver("D1").await.unwrap().is_none());

        repo.transition(trip.id, accept("D1")).await.unwrap();
        let active = repo.active_for_driver("D1").await.unwrap().unwrap();
        assert_eq!(active.id, trip.id);

        repo.transition(trip.id, TripChange::Start).await.unwrap();
        repo.transition(
            trip.id,
            TripChange::Complete {
                final_distance_km: None,
                final_price_cents: None,
            },
        )
        .await
        .unwrap();

        assert!(repo.active_for_customer("C1").await.unwrap().is_none());
        assert!(repo.active_for_driver("D1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_pending_is_oldest_first_and_pending_only() {
        let repo = InMemoryTripRepository::new();
        let mut old = new_trip("C1");
        old.created_at = Utc::now() - chrono::Duration::hours(1);
        let young = new_trip("C2");
        let taken = new_trip("C3");
        repo.insert(&old).await.unwrap();
        repo.insert(&young).await.unwrap();
        repo.insert(&taken).await.unwrap();
        repo.transition(taken.id, accept("D1")).await.unwrap();

        let pending = repo.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, old.id);
        assert_eq!(pending[1].id, young.id);
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let repo = InMemoryTripRepository::new();
        let mut first = new_trip("C1");
        first.created_at = Utc::now() - chrono::Duration::hours(2);
        let mut second = new_trip("C1");
        second.created_at = Utc::now() - chrono::Duration::hours(1);
        let other = new_trip("C2");
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();
        repo.insert(&other).await.unwrap();

        let history = repo.history_for_customer("C1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
    }
}
