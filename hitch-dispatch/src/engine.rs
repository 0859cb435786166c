//! Dispatch engine: opens offer rounds, resolves the accept race, applies
//! lifecycle transitions and pushes the resulting events through the router.
//!
//! Exactly-one-winner rests on the trip store's conditional transition. The
//! offer board in front of it only filters latecomers and tells losers why
//! they lost; nothing here holds a lock across an await on the store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use hitch_core::{DispatchError, DispatchResult};
use hitch_presence::{DriverLocation, DriverPresence, PresenceRegistry};
use hitch_router::{FanoutRouter, Target};
use hitch_shared::models::events::{
    DriverDisconnectedPayload, DriverLocationPayload, JobCancelledPayload, JobRequestPayload,
    JobTakenPayload,
};
use hitch_shared::ServerEvent;
use hitch_store::app_config::DispatchRules;
use hitch_store::TripRepository;
use hitch_trip::{CancelActor, NewTrip, Trip, TripChange, TripStatus};

use crate::models::{JobOffer, OfferBoard, OfferGate, OfferState};

/// What happens to a job whose offer window closes with no winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Re-broadcast to fresh candidates, up to `reoffer_max_rounds` extra
    /// rounds, then cancel.
    Reoffer,
    /// Cancel as soon as the first window closes.
    Cancel,
}

impl ExpiryPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reoffer" => Some(ExpiryPolicy::Reoffer),
            "cancel" => Some(ExpiryPolicy::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub offer_window: Duration,
    pub sweep_interval: std::time::Duration,
    pub expiry_policy: ExpiryPolicy,
    pub reoffer_max_rounds: u32,
    pub candidate_radius_km: Option<f64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offer_window: Duration::seconds(120),
            sweep_interval: std::time::Duration::from_secs(5),
            expiry_policy: ExpiryPolicy::Reoffer,
            reoffer_max_rounds: 2,
            candidate_radius_km: None,
        }
    }
}

impl DispatchConfig {
    pub fn from_rules(rules: &DispatchRules) -> Self {
        let expiry_policy = ExpiryPolicy::parse(&rules.expiry_policy).unwrap_or_else(|| {
            tracing::warn!(
                policy = %rules.expiry_policy,
                "unknown expiry policy, falling back to reoffer"
            );
            ExpiryPolicy::Reoffer
        });
        Self {
            offer_window: Duration::seconds(rules.offer_window_seconds as i64),
            sweep_interval: std::time::Duration::from_secs(rules.sweep_interval_seconds),
            expiry_policy,
            reoffer_max_rounds: rules.reoffer_max_rounds,
            candidate_radius_km: rules.candidate_radius_km,
        }
    }
}

/// Who is asking for a cancellation. Carries the caller identity so the
/// engine can refuse strangers.
#[derive(Debug, Clone)]
pub enum Canceller {
    Customer { id: String, reason: Option<String> },
    Driver { id: String, reason: Option<String> },
    System { reason: String },
}

impl Canceller {
    fn actor(&self) -> CancelActor {
        match self {
            Canceller::Customer { .. } => CancelActor::Customer,
            Canceller::Driver { .. } => CancelActor::Driver,
            Canceller::System { .. } => CancelActor::System,
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            Canceller::Customer { reason, .. } | Canceller::Driver { reason, .. } => reason.clone(),
            Canceller::System { reason } => Some(reason.clone()),
        }
    }
}

/// Counters from one expiry sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub reoffered: usize,
    pub cancelled: usize,
    /// Stored PENDING trips with no round on the board that were given one,
    /// e.g. after a restart with a durable store.
    pub adopted: usize,
}

pub struct DispatchEngine {
    trips: Arc<dyn TripRepository>,
    presence: Arc<PresenceRegistry>,
    router: Arc<FanoutRouter>,
    offers: OfferBoard,
    config: DispatchConfig,
}

impl DispatchEngine {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        presence: Arc<PresenceRegistry>,
        router: Arc<FanoutRouter>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            trips,
            presence,
            router,
            offers: OfferBoard::new(),
            config,
        }
    }

    /// Open a trip and broadcast round zero to every eligible driver.
    pub async fn create_trip(&self, req: NewTrip) -> DispatchResult<Trip> {
        req.validate()?;
        let trip = Trip::new(req);
        self.trips.insert(&trip).await?;

        // Round zero rides on the trip's own creation time, so countdowns
        // clients derive from trip.createdAt agree with the server window.
        self.open_round(&trip, 0, trip.created_at).await;

        tracing::info!(trip_id = %trip.id, customer_id = %trip.customer_id, "trip opened");
        Ok(trip)
    }

    /// Driver claims a pending job. Of N concurrent accepts exactly one
    /// returns Ok; the rest see AlreadyAssigned or OfferExpired.
    pub async fn accept(&self, trip_id: Uuid, driver_id: &str) -> DispatchResult<Trip> {
        let trip = self
            .trips
            .get(trip_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("trip {}", trip_id)))?;

        // 1. Offer gate: filter resolved and overdue rounds before touching
        //    the store. An overdue round is tombstoned right here, so a late
        //    accept fails even if the sweeper has not run yet.
        match self.offers.gate_accept(trip_id, Utc::now()).await {
            OfferGate::Ready => {}
            OfferGate::Resolved => return Err(DispatchError::AlreadyAssigned),
            OfferGate::Expired => return Err(DispatchError::OfferExpired),
            OfferGate::Missing => {
                return Err(match trip.status {
                    // No live round for a pending or cancelled job: gone.
                    TripStatus::Pending | TripStatus::Cancelled => DispatchError::OfferExpired,
                    _ => DispatchError::AlreadyAssigned,
                });
            }
        }

        // 2. Claim the driver. The reservation flips busy inside one lock
        //    scope, so the same driver cannot pass this gate for a second
        //    trip while this accept is still in flight.
        self.presence
            .try_reserve(driver_id, trip_id, trip.service_type)
            .await?;

        // 3. The store's conditional transition picks the single winner.
        //    A loser hands its reservation back.
        let change = TripChange::Accept {
            driver_id: driver_id.to_string(),
        };
        let updated = match self.trips.transition(trip_id, change).await {
            Ok(trip) => trip,
            Err(err) => {
                self.presence.release(driver_id, trip_id).await;
                return Err(match err {
                    DispatchError::StaleState => DispatchError::AlreadyAssigned,
                    DispatchError::InvalidTransition { ref from, .. }
                        if from == TripStatus::Cancelled.as_str() =>
                    {
                        DispatchError::OfferExpired
                    }
                    other => other,
                });
            }
        };

        // 4. Bookkeeping and fan-out. The job is already won; these are
        //    best-effort notifications.
        let resolved = self.offers.resolve(trip_id, driver_id).await;

        if let Some(offer) = resolved {
            let taken = ServerEvent::JobTaken(JobTakenPayload {
                trip_id,
                driver_id: driver_id.to_string(),
            });
            for candidate in offer.candidates.iter().filter(|c| c.as_str() != driver_id) {
                self.router.deliver(&Target::Driver(candidate.clone()), &taken).await;
            }
        }

        self.broadcast_transition(&updated, Some(driver_id), ServerEvent::DriverAccepted(updated.summary()))
            .await;

        tracing::info!(trip_id = %trip_id, driver_id, "job accepted");
        Ok(updated)
    }

    /// Assigned driver starts the ride or tow.
    pub async fn start(&self, trip_id: Uuid, driver_id: &str) -> DispatchResult<Trip> {
        self.ensure_assigned(trip_id, driver_id).await?;
        let updated = self.trips.transition(trip_id, TripChange::Start).await?;
        self.broadcast_transition(&updated, Some(driver_id), ServerEvent::TripStarted(updated.summary()))
            .await;
        Ok(updated)
    }

    /// Assigned driver finishes the trip, optionally correcting the metered
    /// distance and price.
    pub async fn complete(
        &self,
        trip_id: Uuid,
        driver_id: &str,
        final_distance_km: Option<f64>,
        final_price_cents: Option<i64>,
    ) -> DispatchResult<Trip> {
        self.ensure_assigned(trip_id, driver_id).await?;
        let change = TripChange::Complete {
            final_distance_km,
            final_price_cents,
        };
        let updated = self.trips.transition(trip_id, change).await?;

        self.presence.clear_trip(driver_id).await;
        self.offers.remove(trip_id).await;
        self.broadcast_transition(&updated, Some(driver_id), ServerEvent::TripCompleted(updated.summary()))
            .await;

        tracing::info!(trip_id = %trip_id, driver_id, "trip completed");
        Ok(updated)
    }

    /// Cancel a live trip. Customers may cancel their own trip at any stage,
    /// drivers only a trip assigned to them, the system only untaken jobs.
    pub async fn cancel(&self, trip_id: Uuid, canceller: Canceller) -> DispatchResult<Trip> {
        let trip = self
            .trips
            .get(trip_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("trip {}", trip_id)))?;

        match &canceller {
            Canceller::Customer { id, .. } if trip.customer_id != *id => {
                return Err(DispatchError::NotAuthorized)
            }
            Canceller::Driver { id, .. } if trip.driver_id.as_deref() != Some(id.as_str()) => {
                return Err(DispatchError::NotAuthorized)
            }
            _ => {}
        }

        // Cancelling wipes the assignment from the record, so remember who
        // held the job: that driver still has to hear about the cancellation.
        let former_driver = trip.driver_id.clone();

        let change = TripChange::Cancel {
            by: canceller.actor(),
            reason: canceller.reason(),
        };
        let updated = self.trips.transition(trip_id, change).await?;

        // Candidates of a still-open round see the job disappear; the
        // formerly assigned driver is covered by the trip broadcast below.
        let offer = self.offers.get(trip_id).await;
        self.offers.remove(trip_id).await;

        let event = ServerEvent::JobCancelled(JobCancelledPayload {
            trip: updated.summary(),
            cancelled_by: canceller.actor().as_str().to_string(),
            reason: updated.cancel_reason.clone(),
        });
        if let Some(offer) = offer {
            if offer.state == OfferState::Open {
                for candidate in &offer.candidates {
                    if Some(candidate.as_str()) != former_driver.as_deref() {
                        self.router
                            .deliver(&Target::Driver(candidate.clone()), &event)
                            .await;
                    }
                }
            }
        }

        if let Some(driver_id) = &former_driver {
            self.presence.clear_trip(driver_id).await;
        }
        self.broadcast_transition(&updated, former_driver.as_deref(), event).await;

        tracing::info!(trip_id = %trip_id, by = canceller.actor().as_str(), "trip cancelled");
        Ok(updated)
    }

    /// Ingest a driver position tick and fan it out: admins always, the
    /// customer only while this driver is working their trip.
    pub async fn update_driver_location(
        &self,
        driver_id: &str,
        lat: f64,
        lng: f64,
        heading: f64,
        speed: f64,
    ) {
        let location = DriverLocation {
            lat,
            lng,
            heading,
            speed,
            updated_at: Utc::now(),
        };
        let presence = self.presence.update_location(driver_id, location).await;

        let event = ServerEvent::DriverLocationUpdated(DriverLocationPayload {
            driver_id: driver_id.to_string(),
            lat,
            lng,
            heading,
            speed,
            updated_at: presence.last_seen,
            current_trip_id: presence.current_trip_id,
        });
        self.router.deliver(&Target::Admins, &event).await;
        if let Some(customer_id) = self.observer_customer(&presence).await {
            self.router.deliver(&Target::Customer(customer_id), &event).await;
        }
    }

    /// Driver socket went away or the driver went off shift. The presence
    /// record flips offline but keeps its trip linkage: a dropped socket
    /// never cancels an accepted trip.
    pub async fn driver_went_offline(&self, driver_id: &str) {
        let presence = self.presence.get(driver_id).await;
        self.presence.set_offline(driver_id).await;

        let event = ServerEvent::DriverDisconnected(DriverDisconnectedPayload {
            driver_id: driver_id.to_string(),
        });
        self.router.deliver(&Target::Admins, &event).await;
        if let Some(presence) = presence {
            if let Some(customer_id) = self.observer_customer(&presence).await {
                self.router.deliver(&Target::Customer(customer_id), &event).await;
            }
        }
    }

    /// Close overdue offer rounds and apply the expiry policy to each.
    pub async fn sweep_now(&self) -> SweepReport {
        let now = Utc::now();
        let due = self.offers.expire_due(now).await;
        let mut report = SweepReport::default();

        for offer in due {
            report.expired += 1;
            let trip = match self.trips.get(offer.trip_id).await {
                Ok(Some(trip)) if trip.status == TripStatus::Pending => trip,
                Ok(_) => {
                    // Somebody took or ended the trip while the round was
                    // expiring. Drop the round, the store already decided.
                    self.offers.remove(offer.trip_id).await;
                    continue;
                }
                Err(err) => {
                    tracing::error!(trip_id = %offer.trip_id, error = %err, "sweep could not read trip");
                    continue;
                }
            };

            match self.config.expiry_policy {
                ExpiryPolicy::Reoffer if offer.round < self.config.reoffer_max_rounds => {
                    let round = offer.round + 1;
                    let reached = self.open_round(&trip, round, now).await;
                    tracing::info!(trip_id = %trip.id, round, reached, "offer window closed, re-broadcasting");
                    report.reoffered += 1;
                }
                _ => {
                    let canceller = Canceller::System {
                        reason: "no driver found".to_string(),
                    };
                    match self.cancel(trip.id, canceller).await {
                        Ok(_) => report.cancelled += 1,
                        Err(err) => {
                            // A racing accept won between our read and the
                            // conditional cancel. That is the good outcome.
                            tracing::debug!(trip_id = %trip.id, error = %err, "expiry cancel lost to a live transition");
                        }
                    }
                }
            }
        }

        // The offer board is volatile; a durable store can hold PENDING
        // trips the board has never seen after a restart. Give each an offer
        // round so no trip hangs pending forever. Trips younger than one
        // sweep interval are left alone: their opening broadcast may still
        // be in flight on the task that created them.
        let grace = Duration::from_std(self.config.sweep_interval)
            .unwrap_or_else(|_| Duration::seconds(5));
        match self.trips.list_pending().await {
            Ok(pending) => {
                for trip in pending {
                    if now.signed_duration_since(trip.created_at) < grace {
                        continue;
                    }
                    if self.offers.get(trip.id).await.is_some() {
                        continue;
                    }
                    let reached = self.open_round(&trip, 0, now).await;
                    tracing::info!(trip_id = %trip.id, reached, "adopted pending trip with no offer round");
                    report.adopted += 1;
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "sweep could not list pending trips");
            }
        }
        report
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        self.config.sweep_interval
    }

    /// Broadcast one offer round to current candidates and admins. Returns
    /// how many drivers were offered the job.
    async fn open_round(&self, trip: &Trip, round: u32, window_start: DateTime<Utc>) -> usize {
        let pickup = trip.pickup.point();
        let candidates = self
            .presence
            .candidates(trip.service_type, Some(&pickup), self.config.candidate_radius_km)
            .await;
        let ids: HashSet<String> = candidates.iter().map(|c| c.driver_id.clone()).collect();
        if ids.is_empty() {
            tracing::warn!(trip_id = %trip.id, round, "no dispatchable drivers for job");
        }

        let offer = JobOffer::new(trip.id, ids.clone(), window_start, self.config.offer_window, round);
        let event = ServerEvent::NewJobRequest(JobRequestPayload {
            trip: trip.summary(),
            round,
            offer_created_at: offer.created_at,
            offer_expires_at: offer.expires_at,
        });
        self.offers.open(offer).await;

        for driver_id in &ids {
            self.router.deliver(&Target::Driver(driver_id.clone()), &event).await;
        }
        self.router.deliver(&Target::Admins, &event).await;
        ids.len()
    }

    /// Deliver the specific event, then a tripUpdated echo, to everyone who
    /// follows this trip: its customer, the driver working it (or the one
    /// who just lost it to a cancellation) and all admins.
    async fn broadcast_transition(&self, trip: &Trip, driver: Option<&str>, event: ServerEvent) {
        let mut targets = vec![Target::Customer(trip.customer_id.clone())];
        if let Some(driver_id) = driver {
            targets.push(Target::Driver(driver_id.to_string()));
        }
        targets.push(Target::Admins);

        for target in &targets {
            self.router.deliver(target, &event).await;
        }
        let updated = ServerEvent::TripUpdated(trip.summary());
        for target in &targets {
            self.router.deliver(target, &updated).await;
        }
    }

    /// Trip actions after accept must come from the assigned driver.
    async fn ensure_assigned(&self, trip_id: Uuid, driver_id: &str) -> DispatchResult<()> {
        let trip = self
            .trips
            .get(trip_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("trip {}", trip_id)))?;
        if trip.driver_id.as_deref() != Some(driver_id) {
            return Err(DispatchError::NotAuthorized);
        }
        Ok(())
    }

    /// Customer entitled to this driver's position ticks right now.
    async fn observer_customer(&self, presence: &DriverPresence) -> Option<String> {
        let trip_id = presence.current_trip_id?;
        match self.trips.get(trip_id).await {
            Ok(Some(trip))
                if matches!(trip.status, TripStatus::Accepted | TripStatus::InProgress)
                    && trip.driver_id.as_deref() == Some(presence.driver_id.as_str()) =>
            {
                Some(trip.customer_id)
            }
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(error = %err, "could not resolve location observer");
                None
            }
        }
    }
}

/// Background loop closing overdue offer rounds.
pub fn spawn_sweeper(engine: Arc<DispatchEngine>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(engine.sweep_interval());
        loop {
            ticker.tick().await;
            let report = engine.sweep_now().await;
            if report != SweepReport::default() {
                tracing::info!(
                    expired = report.expired,
                    reoffered = report.reoffered,
                    cancelled = report.cancelled,
                    adopted = report.adopted,
                    "expiry sweep"
                );
            }
        }
    })
}
