use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::vehicle::VehicleStatus;
use crate::domain::{into_position, validate, FieldError, Position, RawPositionUpdate, Room};
use crate::error::AppError;
use crate::eventlog::Topic;
use crate::gate::{self, GateDecision, NEXT_PING_MS};
use crate::state::AppState;

/// Public-facing outcome of a single push, shared between the HTTP handler
/// and the WebSocket `push:location` path (§4.F "an alternate low-overhead
/// ingest path equivalent to calling §4.G").
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(rename = "nextPingMs")]
    pub next_ping_ms: u64,
}

/// Body shape for a single push — `vehicleId` comes from the path, not the
/// body, so it is deliberately excluded here.
#[derive(Debug, Deserialize)]
pub struct PushSingleBody {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
}

/// POST `/api/vehicles/:id/location` (§4.G "Push single").
pub async fn push_single(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
    Json(body): Json<PushSingleBody>,
) -> Result<Json<IngestOutcome>, AppError> {
    let raw = RawPositionUpdate {
        vehicle_id,
        lat: body.lat,
        lng: body.lng,
        speed: body.speed,
        heading: body.heading,
        accuracy: body.accuracy,
        altitude: body.altitude,
        timestamp_ms: body.timestamp_ms,
    };
    let outcome = ingest_single(&state, raw).await?;
    Ok(Json(outcome))
}

/// Core single-push pipeline (§4.G: gate → cache put → log publish, with
/// direct-write fallback on log failure). Response time must not depend on
/// persistence latency in the happy path — the log publish is a single
/// bounded-retry call, not a wait for the persistence worker.
pub async fn ingest_single(
    state: &AppState,
    raw: RawPositionUpdate,
) -> Result<IngestOutcome, AppError> {
    validate(&raw).map_err(|errs| AppError::Validation {
        details: errs.iter().map(|e: &FieldError| e.as_str().to_string()).collect(),
    })?;
    let now_ms = crate::now_ms();
    let pos = into_position(raw, now_ms);

    state.metrics.incr_ingested();

    let deadline = state.config.ingest_deadline;
    let decision = match tokio::time::timeout(
        deadline,
        gate::run(&state.cache, &state.config, &pos.vehicle_id, pos.lat, pos.lng),
    )
    .await
    {
        Ok(d) => d,
        // Soft deadline exceeded: the gate's contribution is skipped and
        // the request proceeds as if accepted forward (§5 "fail-open").
        Err(_) => GateDecision::AcceptedForward,
    };

    match decision {
        GateDecision::Throttled { retry_after_ms } => {
            state.metrics.incr_throttled();
            return Err(AppError::Throttled { retry_after_ms });
        }
        GateDecision::AcceptedNoMotion => {
            state.metrics.incr_no_motion();
            return Ok(IngestOutcome {
                accepted: true,
                reason: Some("no_movement"),
                next_ping_ms: gate::NEXT_PING_MS,
            });
        }
        GateDecision::AcceptedForward => {}
    }

    state.metrics.incr_accepted_forward();

    if let Err(e) = state.cache.put(&pos.vehicle_id, &pos).await {
        // Fail-silent (§4.A): log, continue.
        state.metrics.incr_cache_write_failed();
        tracing::warn!(error = %e, vehicle_id = %pos.vehicle_id, "cache_put_failed");
    }

    let payload = serde_json::to_vec(&pos).map_err(|e| AppError::Internal(e.to_string()))?;
    let published = state
        .log
        .publish(Topic::VehicleLocations, &pos.vehicle_id, &payload)
        .await;

    if !published {
        state.metrics.incr_log_publish_failed();
        direct_write_fallback(state, &pos).await?;
    }

    Ok(IngestOutcome {
        accepted: true,
        reason: None,
        next_ping_ms: NEXT_PING_MS,
    })
}

/// §4.D-direct: bypass D entirely, write directly to the history store in
/// the request path, update the descriptor, and broadcast via F inline.
///
/// §9 Open Question (b): the source fires-and-forgets this write while
/// still returning success. DESIGN.md records the decision to strengthen
/// the contract — a direct-write failure here propagates as a 500 rather
/// than silently claiming success, since the caller has no other durability
/// guarantee once the log has already been ruled out.
async fn direct_write_fallback(state: &AppState, pos: &Position) -> Result<(), AppError> {
    state.metrics.incr_direct_write_fallback();
    if let Err(e) = state.history.insert_one(pos).await {
        state.metrics.incr_direct_write_failed();
        tracing::error!(error = %e, vehicle_id = %pos.vehicle_id, "direct_write_failed");
        return Err(AppError::Internal(format!("direct write failed: {e}")));
    }
    if let Err(e) = state
        .vehicles
        .update_status_and_last_seen(&[pos.vehicle_id.clone()], VehicleStatus::Active, pos.timestamp_ms)
        .await
    {
        tracing::warn!(error = %e, "direct_write_descriptor_update_failed");
    }
    state.broker.push_to_room(
        &Room::Vehicle(pos.vehicle_id.clone()),
        crate::broker::ServerEvent::Location(pos.clone()),
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct PushBatchBody {
    pub updates: Vec<RawPositionUpdate>,
}

#[derive(Debug, Serialize)]
pub struct PushBatchResponse {
    pub processed: usize,
    pub rejected: usize,
    #[serde(rename = "rejectedIds")]
    pub rejected_ids: Vec<String>,
}

const MAX_BATCH: usize = 1000;
const MAX_REJECTED_IDS: usize = 10;

/// POST `/api/vehicles/batch/locations` (§4.G "Push batch").
pub async fn push_batch(
    State(state): State<AppState>,
    Json(body): Json<PushBatchBody>,
) -> Result<Json<PushBatchResponse>, AppError> {
    let updates: Vec<RawPositionUpdate> = body.updates.into_iter().take(MAX_BATCH).collect();
    let now_ms = crate::now_ms();

    let mut valid = Vec::with_capacity(updates.len());
    let mut rejected_ids = Vec::new();
    let mut rejected = 0usize;

    for raw in updates {
        match validate(&raw) {
            Ok(()) => valid.push(into_position(raw, now_ms)),
            Err(_) => {
                rejected += 1;
                if rejected_ids.len() < MAX_REJECTED_IDS {
                    rejected_ids.push(raw.vehicle_id);
                }
            }
        }
    }

    if !valid.is_empty() {
        if let Err(e) = state.cache.put_batch(&valid).await {
            state.metrics.incr_cache_write_failed();
            tracing::warn!(error = %e, "batch_cache_put_failed");
        }

        let records: Vec<(String, Vec<u8>)> = valid
            .iter()
            .filter_map(|p| serde_json::to_vec(p).ok().map(|payload| (p.vehicle_id.clone(), payload)))
            .collect();
        let published = state
            .log
            .publish_batch(Topic::VehicleLocations, &records)
            .await;

        if !published {
            state.metrics.incr_log_publish_failed();
            bulk_direct_write_fallback(&state, &valid).await;
        }
    }

    Ok(Json(PushBatchResponse {
        processed: valid.len(),
        rejected,
        rejected_ids,
    }))
}

/// Bulk analogue of `direct_write_fallback` for batch pushes (§4.G "fall
/// through to bulk direct-write"). Unlike the single-push path this does
/// not broadcast per-vehicle — the batch path is meant for bulk
/// device-fleet ingestion, not the low-latency single-device path the
/// broker's `push:location` relies on.
async fn bulk_direct_write_fallback(state: &AppState, positions: &[Position]) {
    if let Err(e) = state.history.insert_many(positions).await {
        state.metrics.incr_direct_write_failed();
        tracing::error!(error = %e, count = positions.len(), "bulk_direct_write_failed");
        return;
    }
    let distinct: std::collections::HashSet<&str> =
        positions.iter().map(|p| p.vehicle_id.as_str()).collect();
    let ids: Vec<String> = distinct.into_iter().map(String::from).collect();
    let now_ms = crate::now_ms();
    if let Err(e) = state
        .vehicles
        .update_status_and_last_seen(&ids, VehicleStatus::Active, now_ms)
        .await
    {
        tracing::warn!(error = %e, "bulk_direct_write_descriptor_update_failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use crate::cache::InMemoryCache;
    use crate::config::Config;
    use crate::eventlog::InMemoryEventLog;
    use crate::metrics::Metrics;
    use crate::store::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        AppState {
            config: Arc::new(Config {
                port: 8080,
                mongo_uri: "mongodb://localhost".into(),
                redis_url: None,
                kafka_brokers: None,
                jwt_secret: None,
                client_url: None,
                node_env: "test".into(),
                cache_ttl: Duration::from_secs(300),
                throttle_window: Duration::from_secs(1),
                throttle_max: 5,
                dead_zone_min_m: 10.0,
                history_retention: Duration::from_secs(30 * 24 * 3600),
                batch_max_bytes: 1024 * 1024,
                ingest_deadline: Duration::from_secs(2),
            }),
            cache: Arc::new(InMemoryCache::new(Duration::from_secs(300))),
            cache_backend: crate::cache::CacheBackend::Memory,
            log: Arc::new(InMemoryEventLog::new()),
            log_available: true,
            history: Arc::new(InMemoryStore::new()),
            vehicles: Arc::new(InMemoryStore::new()),
            broker: Broker::new(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    fn raw(id: &str, lat: f64, lng: f64) -> RawPositionUpdate {
        RawPositionUpdate {
            vehicle_id: id.into(),
            lat,
            lng,
            speed: 30.0,
            heading: 0.0,
            accuracy: 0.0,
            altitude: 0.0,
            timestamp_ms: None,
        }
    }

    #[tokio::test]
    async fn scenario_s1_happy_path_single_push() {
        let state = test_state();
        let outcome = ingest_single(&state, raw("veh_abc", 12.97, 77.59)).await.unwrap();
        assert!(outcome.accepted);
        assert!(outcome.reason.is_none());

        let cached = state.cache.get("veh_abc").await.unwrap().unwrap();
        assert_eq!(cached.lat, 12.97);
    }

    #[tokio::test]
    async fn scenario_s2_stationary_suppression() {
        let state = test_state();
        let first = ingest_single(&state, raw("veh_s2", 12.97, 77.59)).await.unwrap();
        assert!(first.reason.is_none());
        let second = ingest_single(&state, raw("veh_s2", 12.97, 77.59)).await.unwrap();
        assert_eq!(second.reason, Some("no_movement"));
    }

    #[tokio::test]
    async fn scenario_s3_sixth_push_in_one_second_is_throttled() {
        let state = test_state();
        for i in 0..5 {
            let r = raw("veh_x", 12.97 + (i as f64) * 0.001, 77.59);
            assert!(ingest_single(&state, r).await.unwrap().accepted);
        }
        let sixth = ingest_single(&state, raw("veh_x", 12.975, 77.59)).await;
        match sixth {
            Err(AppError::Throttled { retry_after_ms }) => assert_eq!(retry_after_ms, 1000),
            other => panic!("expected Throttled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scenario_s4_batch_with_one_invalid() {
        let state = test_state();
        let body = PushBatchBody {
            updates: vec![raw("a", 0.0, 0.0), raw("b", 999.0, 0.0)],
        };
        let Json(resp) = push_batch(State(state), Json(body)).await.unwrap();
        assert_eq!(resp.processed, 1);
        assert_eq!(resp.rejected, 1);
        assert_eq!(resp.rejected_ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn invariant_3_processed_plus_rejected_equals_n() {
        let state = test_state();
        let updates: Vec<RawPositionUpdate> = (0..20)
            .map(|i| {
                if i % 3 == 0 {
                    raw(&format!("veh_{i}"), 999.0, 0.0)
                } else {
                    raw(&format!("veh_{i}"), 1.0, 1.0)
                }
            })
            .collect();
        let n = updates.len();
        let body = PushBatchBody { updates };
        let Json(resp) = push_batch(State(state), Json(body)).await.unwrap();
        assert_eq!(resp.processed + resp.rejected, n);
    }
}
