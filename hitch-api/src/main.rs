use std::net::SocketAddr;
use std::sync::Arc;

use hitch_api::{app, AppState};
use hitch_dispatch::{spawn_sweeper, DispatchConfig, DispatchEngine};
use hitch_presence::PresenceRegistry;
use hitch_router::FanoutRouter;
use hitch_store::{DbClient, InMemoryTripRepository, PgTripRepository, TripRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hitch_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = hitch_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Hitch dispatch API on port {}", config.server.port);

    let trips: Arc<dyn TripRepository> = match config.store.backend.as_str() {
        "postgres" => {
            let url = config
                .store
                .url
                .as_deref()
                .expect("store.url is required for the postgres backend");
            let db = DbClient::new(url).await.expect("Failed to connect to Postgres");
            db.migrate().await.expect("Failed to run migrations");
            Arc::new(PgTripRepository::new(db.pool.clone()))
        }
        "memory" => Arc::new(InMemoryTripRepository::new()),
        other => panic!("Unknown store backend: {}", other),
    };

    let staleness = chrono::Duration::seconds(config.dispatch.location_staleness_seconds as i64);
    let presence = Arc::new(PresenceRegistry::new(staleness));
    let router = Arc::new(FanoutRouter::new());
    let engine = Arc::new(DispatchEngine::new(
        trips.clone(),
        presence.clone(),
        router.clone(),
        DispatchConfig::from_rules(&config.dispatch),
    ));

    // Offer windows are enforced server-side; clients only render countdowns.
    spawn_sweeper(engine.clone());

    let state = AppState {
        trips,
        presence,
        router,
        engine,
    };
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
