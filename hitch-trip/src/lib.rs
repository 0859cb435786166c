pub mod lifecycle;
pub mod models;

pub use lifecycle::TripChange;
pub use models::{CancelActor, NewTrip, Trip, TripStatus};
