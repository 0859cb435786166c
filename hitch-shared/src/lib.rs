pub mod models;

pub use models::events::{ClientEvent, ServerEvent};
pub use models::{GeoPoint, Location, ServiceType, VehicleSnapshot};
