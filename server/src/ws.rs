use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth;
use crate::broker::session::{Session, SessionHandle, SessionIdentity};
use crate::domain::{Room, RawPositionUpdate};
use crate::http::ingress::ingest_single;
use crate::http::query::{self, NearbyQuery};
use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(10);
const PONG_TIMEOUT: Duration = Duration::from_secs(20);
const OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Opaque bearer credential carried at handshake (§6 "Handshake carries
    /// an opaque bearer credential in `auth.token`"). A raw `WebSocket`
    /// upgrade has no room for an `auth` object the way a socket.io
    /// handshake does, so it travels as a query parameter instead.
    pub token: Option<String>,
}

/// GET `/ws` — socket entry point (§4.F, §6 "Socket protocol").
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    let identity =
        auth::identity_from_optional_token(q.token.as_deref(), state.config.jwt_secret.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum ClientMessage {
    #[serde(rename = "subscribe:vehicle")]
    SubscribeVehicle { vehicle_id: String },
    #[serde(rename = "unsubscribe:vehicle")]
    UnsubscribeVehicle { vehicle_id: String },
    #[serde(rename = "subscribe:fleet")]
    SubscribeFleet { fleet_id: String },
    #[serde(rename = "push:location")]
    PushLocation(RawPositionUpdate),
    #[serde(rename = "get:nearby")]
    GetNearby { lat: f64, lng: f64 },
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: SessionIdentity) {
    let session = Session::new(identity);
    let (tx, mut rx) = mpsc::channel(OUTBOX_CAPACITY);
    state.broker.register(SessionHandle::new(session.id, tx));
    state.metrics.incr_socket_sessions_opened();

    let (mut sink, mut stream) = socket.split();
    let mut joined_rooms: Vec<Room> = Vec::new();
    let mut last_pong = tokio::time::Instant::now();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            // Server → client: forward whatever the broker pushed to this
            // session's rooms (§4.F "Back-pressure" — the receiver side of
            // this channel is exactly what makes a full channel a dropped
            // message rather than a blocked publisher).
            outgoing = rx.recv() => {
                match outgoing {
                    Some(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, &session, &mut joined_rooms, &text).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }

            _ = ping_interval.tick() => {
                if last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::info!(session = %session.id, "socket_ping_timeout");
                    break;
                }
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.broker.disconnect(session.id);
    state.metrics.incr_socket_sessions_closed();
}

async fn handle_client_message(
    state: &AppState,
    session: &Session,
    joined_rooms: &mut Vec<Room>,
    text: &str,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(error = %e, "ws_malformed_client_message");
            return;
        }
    };

    match msg {
        ClientMessage::SubscribeVehicle { vehicle_id } => {
            let room = Room::Vehicle(vehicle_id.clone());
            state.broker.join(session.id, room.clone());
            joined_rooms.push(room);
            send_subscribe_snapshot(state, session, &vehicle_id).await;
        }
        ClientMessage::UnsubscribeVehicle { vehicle_id } => {
            let room = Room::Vehicle(vehicle_id);
            state.broker.leave(session.id, &room);
            joined_rooms.retain(|r| r != &room);
        }
        ClientMessage::SubscribeFleet { fleet_id } => {
            let room = Room::Fleet(fleet_id);
            state.broker.join(session.id, room.clone());
            joined_rooms.push(room);
        }
        ClientMessage::PushLocation(raw) => {
            // Authenticated sessions only (§4.F `push_location`).
            if !session.identity.is_authenticated() {
                return;
            }
            if let Err(e) = ingest_single(state, raw).await {
                tracing::debug!(error = ?e, "ws_push_location_rejected");
            }
        }
        ClientMessage::GetNearby { lat, lng } => {
            if let Ok(entries) = query::get_nearby(
                State(state.clone()),
                Query(NearbyQuery { lat, lng, radius: 1.0 }),
            )
            .await
            {
                let summary = entries
                    .0
                    .iter()
                    .map(|e| crate::broker::NearbySummary::from(&e.position))
                    .collect();
                state
                    .broker
                    .send_to_session(session.id, crate::broker::ServerEvent::NearbySnapshot(summary));
            }
        }
    }
}

/// On `subscribe(vehicle_id)`, respond immediately with the current cache
/// entry, or on miss the newest history record, or nothing if neither
/// exists (§4.F).
async fn send_subscribe_snapshot(state: &AppState, session: &Session, vehicle_id: &str) {
    let snapshot = match state.cache.get(vehicle_id).await.unwrap_or(None) {
        Some(pos) => Some(pos),
        None => state.history.query_current(vehicle_id).await.ok().flatten(),
    };
    if let Some(pos) = snapshot {
        // This reply is addressed to one session, not a room broadcast —
        // deliver it directly through the broker's per-session handle
        // rather than widening the room to include it.
        state
            .broker
            .send_to_session(session.id, crate::broker::ServerEvent::Location(pos));
    }
}

