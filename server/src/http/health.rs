use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::metrics::MetricsSnapshot;
use crate::state::{AppState, HealthFlags};

/// GET `/health` (§6 "Liveness + component flags").
pub async fn health(State(state): State<AppState>) -> Json<HealthFlags> {
    Json(state.health_flags())
}

/// GET `/ready` (SPEC_FULL §6 "[AMBIENT] `/health` detail"). Unlike
/// `/health`, which reports the last-known component flags without
/// blocking, this probes the one dependency with no fallback: the system
/// of record. 503 means the process is alive but shouldn't receive traffic.
pub async fn ready(State(state): State<AppState>) -> StatusCode {
    match state.history.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness_store_ping_failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET `/metrics`, carried over from the teacher's C4 observability design
/// note — every accept/reject/drop path increments one counter, surfaced
/// here verbatim.
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    let mut snapshot = state.metrics.snapshot();
    snapshot.socket_messages_dropped = state.broker.dropped_count();
    Json(snapshot)
}
