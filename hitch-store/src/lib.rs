pub mod app_config;
pub mod database;
pub mod memory_repo;
pub mod repository;
pub mod trip_repo;

pub use database::DbClient;
pub use memory_repo::InMemoryTripRepository;
pub use repository::TripRepository;
pub use trip_repo::PgTripRepository;
