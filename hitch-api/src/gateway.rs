//! Session gateway: role-tagged websocket connections.
//!
//! Each socket registers one subscription with the fan-out router and runs a
//! writer task that turns queued [`ServerEvent`]s into text frames. Inbound
//! frames are parsed into [`ClientEvent`]s and dispatched against the
//! connection's role; a failed action comes back as an `actionFailed` frame
//! on the same socket instead of tearing it down.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use hitch_core::DispatchError;
use hitch_dispatch::Canceller;
use hitch_router::{Role, Subscription, Target};
use hitch_shared::models::events::{ActionFailedPayload, DriverSnapshotPayload};
use hitch_shared::{ClientEvent, ServerEvent};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub role: Role,
    pub id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/ws", get(ws_handler))
}

/// GET /v1/ws?role={customer|driver|admin}&id={entityId}
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn handle_socket(socket: WebSocket, params: ConnectParams, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();

    let subscription = Subscription::new(params.role, params.id.clone());
    let connection_id = subscription.connection_id;
    state.router.register(subscription, tx.clone()).await;
    tracing::info!(%connection_id, role = ?params.role, id = %params.id, "socket connected");

    let mut outbound = UnboundedReceiverStream::new(rx);
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.next().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::error!(error = %err, "dropping unserializable event");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    match params.role {
        Role::Driver => {
            // A bare connection is presence without capabilities; the
            // goOnline frame fills those in.
            state.presence.connect(&params.id).await;
        }
        Role::Admin => {
            // Fleet snapshot so the console renders without polling.
            let snapshot = state.presence.snapshot().await;
            let _ = tx.send(ServerEvent::AllDriverLocations(
                snapshot.iter().map(DriverSnapshotPayload::from).collect(),
            ));
        }
        Role::Customer => {}
    }

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let event = match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(%connection_id, error = %err, "unparseable client frame");
                let _ = tx.send(ServerEvent::ActionFailed(ActionFailedPayload {
                    trip_id: None,
                    code: "VALIDATION".to_string(),
                    message: "unrecognized frame".to_string(),
                }));
                continue;
            }
        };

        let trip_id = event_trip_id(&event);
        if let Err(err) = dispatch_client_event(&state, &params, event).await {
            let _ = tx.send(ServerEvent::ActionFailed(ActionFailedPayload {
                trip_id,
                code: err.code().to_string(),
                message: err.to_string(),
            }));
        }
    }

    state.router.unregister(connection_id).await;
    if params.role == Role::Driver {
        // Only the driver's last socket flips presence; a phone that
        // reconnected before the old socket died keeps the driver online.
        let remaining = state
            .router
            .connection_count(&Target::Driver(params.id.clone()))
            .await;
        if remaining == 0 {
            state.engine.driver_went_offline(&params.id).await;
        }
    }
    writer.abort();
    tracing::info!(%connection_id, "socket closed");
}

async fn dispatch_client_event(
    state: &AppState,
    params: &ConnectParams,
    event: ClientEvent,
) -> Result<(), DispatchError> {
    match event {
        ClientEvent::GoOnline(payload) => {
            require_role(params, Role::Driver)?;
            state
                .presence
                .set_online(&params.id, payload.vehicle, payload.capabilities)
                .await;
            Ok(())
        }
        ClientEvent::GoOffline => {
            require_role(params, Role::Driver)?;
            state.engine.driver_went_offline(&params.id).await;
            Ok(())
        }
        ClientEvent::UpdateLocation(payload) => {
            require_role(params, Role::Driver)?;
            state
                .engine
                .update_driver_location(
                    &params.id,
                    payload.lat,
                    payload.lng,
                    payload.heading,
                    payload.speed,
                )
                .await;
            Ok(())
        }
        ClientEvent::AcceptJob(payload) => {
            require_role(params, Role::Driver)?;
            state.engine.accept(payload.trip_id, &params.id).await?;
            Ok(())
        }
        ClientEvent::StartTrip(payload) => {
            require_role(params, Role::Driver)?;
            state.engine.start(payload.trip_id, &params.id).await?;
            Ok(())
        }
        ClientEvent::CompleteTrip(payload) => {
            require_role(params, Role::Driver)?;
            state
                .engine
                .complete(
                    payload.trip_id,
                    &params.id,
                    payload.final_distance_km,
                    payload.final_price_cents,
                )
                .await?;
            Ok(())
        }
        ClientEvent::CancelTrip(payload) => {
            // Customers and drivers share the frame; the connection's role
            // picks the authorization path.
            let canceller = match params.role {
                Role::Customer => Canceller::Customer {
                    id: params.id.clone(),
                    reason: payload.reason,
                },
                Role::Driver => Canceller::Driver {
                    id: params.id.clone(),
                    reason: payload.reason,
                },
                Role::Admin => return Err(DispatchError::NotAuthorized),
            };
            state.engine.cancel(payload.trip_id, canceller).await?;
            Ok(())
        }
    }
}

fn require_role(params: &ConnectParams, required: Role) -> Result<(), DispatchError> {
    if params.role == required {
        Ok(())
    } else {
        Err(DispatchError::NotAuthorized)
    }
}

fn event_trip_id(event: &ClientEvent) -> Option<Uuid> {
    match event {
        ClientEvent::AcceptJob(p) | ClientEvent::StartTrip(p) => Some(p.trip_id),
        ClientEvent::CompleteTrip(p) => Some(p.trip_id),
        ClientEvent::CancelTrip(p) => Some(p.trip_id),
        ClientEvent::GoOnline(_) | ClientEvent::GoOffline | ClientEvent::UpdateLocation(_) => None,
    }
}
