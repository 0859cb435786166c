//! Offer rounds and the board that arbitrates them.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Where an offer round stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferState {
    Open,
    Resolved,
    Expired,
}

/// One broadcast round of a job offer. `round` 0 is the original broadcast,
/// higher rounds are re-offers after an expiry.
#[derive(Debug, Clone)]
pub struct JobOffer {
    pub trip_id: Uuid,
    pub candidates: HashSet<String>,
    pub round: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: OfferState,
    pub winner: Option<String>,
}

impl JobOffer {
    pub fn new(
        trip_id: Uuid,
        candidates: HashSet<String>,
        created_at: DateTime<Utc>,
        window: Duration,
        round: u32,
    ) -> Self {
        Self {
            trip_id,
            candidates,
            round,
            created_at,
            expires_at: created_at + window,
            state: OfferState::Open,
            winner: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.state == OfferState::Open && !self.is_expired(now)
    }
}

/// What the accept gate found on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferGate {
    Ready,
    Missing,
    Resolved,
    Expired,
}

/// Live offer rounds keyed by trip id.
///
/// Every check-and-flip happens under one lock, so an accept and the expiry
/// sweep can never both claim the same round. The store's conditional update
/// stays the final authority on who owns the trip; the board exists to give
/// losers and latecomers precise answers.
pub struct OfferBoard {
    offers: Mutex<HashMap<Uuid, JobOffer>>,
}

impl OfferBoard {
    pub fn new() -> Self {
        Self {
            offers: Mutex::new(HashMap::new()),
        }
    }

    /// Put a round on the board, replacing any previous round for the trip.
    pub async fn open(&self, offer: JobOffer) {
        let mut offers = self.offers.lock().await;
        offers.insert(offer.trip_id, offer);
    }

    pub async fn get(&self, trip_id: Uuid) -> Option<JobOffer> {
        let offers = self.offers.lock().await;
        offers.get(&trip_id).cloned()
    }

    /// Accept-side gate. An overdue open round is flipped to Expired right
    /// here, so late accepts are rejected even before the sweeper has run.
    pub async fn gate_accept(&self, trip_id: Uuid, now: DateTime<Utc>) -> OfferGate {
        let mut offers = self.offers.lock().await;
        match offers.get_mut(&trip_id) {
            None => OfferGate::Missing,
            Some(offer) => match offer.state {
                OfferState::Resolved => OfferGate::Resolved,
                OfferState::Expired => OfferGate::Expired,
                OfferState::Open => {
                    if offer.is_expired(now) {
                        offer.state = OfferState::Expired;
                        OfferGate::Expired
                    } else {
                        OfferGate::Ready
                    }
                }
            },
        }
    }

    /// Record the winning driver. Unconditional: the caller has already won
    /// the store's conditional update, which outranks any board state.
    pub async fn resolve(&self, trip_id: Uuid, winner: &str) -> Option<JobOffer> {
        let mut offers = self.offers.lock().await;
        let offer = offers.get_mut(&trip_id)?;
        offer.state = OfferState::Resolved;
        offer.winner = Some(winner.to_string());
        Some(offer.clone())
    }

    pub async fn remove(&self, trip_id: Uuid) {
        let mut offers = self.offers.lock().await;
        offers.remove(&trip_id);
    }

    /// Collect every overdue, unresolved round for policy handling, flipping
    /// open ones to Expired. Rounds the accept gate already tombstoned are
    /// included: they still owe the trip a re-offer or a cancellation, and
    /// they stay on the board until the policy replaces or removes them.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Vec<JobOffer> {
        let mut offers = self.offers.lock().await;
        let mut due = Vec::new();
        for offer in offers.values_mut() {
            match offer.state {
                OfferState::Open if offer.is_expired(now) => {
                    offer.state = OfferState::Expired;
                    due.push(offer.clone());
                }
                OfferState::Expired => due.push(offer.clone()),
                _ => {}
            }
        }
        due
    }
}

impl Default for OfferBoard {
    fn default() -> Self {
        Self::new()
    }
}
