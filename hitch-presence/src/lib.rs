pub mod models;
pub mod registry;

pub use models::{DriverLocation, DriverPresence};
pub use registry::PresenceRegistry;
