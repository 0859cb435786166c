pub mod engine;
pub mod models;

pub use engine::{spawn_sweeper, Canceller, DispatchConfig, DispatchEngine, ExpiryPolicy, SweepReport};
pub use models::{JobOffer, OfferBoard, OfferGate, OfferState};
