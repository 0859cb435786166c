use axum::{extract::State, routing::get, Json, Router};

use hitch_shared::models::events::DriverSnapshotPayload;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/admin/drivers", get(list_drivers))
}

/// GET /v1/admin/drivers
/// Fleet snapshot for the admin console, same shape as the socket's
/// allDriverLocations event.
async fn list_drivers(
    State(state): State<AppState>,
) -> Result<Json<Vec<DriverSnapshotPayload>>, ApiError> {
    let drivers = state.presence.snapshot().await;
    Ok(Json(drivers.iter().map(DriverSnapshotPayload::from).collect()))
}
