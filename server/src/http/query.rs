use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::{Position, VehicleDescriptor};
use crate::error::AppError;
use crate::geo::planar_distance_km;
use crate::state::AppState;

const NEARBY_WINDOW_MS: u64 = 60_000;
const NEARBY_MAX_RADIUS_KM: f64 = 5.0;
const NEARBY_CAP: usize = 100;

#[derive(Debug, Serialize)]
pub struct CurrentResponse {
    #[serde(flatten)]
    pub position: Position,
    #[serde(rename = "_source")]
    pub source: &'static str,
}

/// GET `/api/vehicles/:id/location` (§4.H `get_current`). Cache first; on
/// miss, history store; on history hit, repopulate the cache; on history
/// miss, `NotFound`.
pub async fn get_current(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<CurrentResponse>, AppError> {
    if let Some(pos) = state.cache.get(&vehicle_id).await.unwrap_or(None) {
        return Ok(Json(CurrentResponse {
            position: pos,
            source: "cache",
        }));
    }

    match state.history.query_current(&vehicle_id).await? {
        Some(pos) => {
            if let Err(e) = state.cache.put(&vehicle_id, &pos).await {
                tracing::warn!(error = %e, vehicle_id, "cache_repopulate_failed");
            }
            Ok(Json(CurrentResponse {
                position: pos,
                source: "history",
            }))
        }
        None => Err(AppError::NotFound),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<u64>,
    pub to: Option<u64>,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub records: Vec<Position>,
    pub page: u32,
    pub limit: u32,
}

/// GET `/api/vehicles/:id/history` (§4.H `get_history`), `limit` capped at
/// 1000 inside the store layer.
pub async fn get_history(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = q.limit.min(1000);
    let records = state
        .history
        .query_history(&vehicle_id, q.from, q.to, q.page, limit)
        .await?;
    Ok(Json(HistoryResponse {
        records,
        page: q.page,
        limit,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "default_radius")]
    pub radius: f64,
}

fn default_radius() -> f64 {
    1.0
}

#[derive(Debug, Serialize)]
pub struct NearbyEntry {
    #[serde(flatten)]
    pub position: Position,
    pub distance_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleDescriptor>,
}

/// GET `/api/nearby?lat=&lng=&radius=` (§4.H `get_nearby`). Positions from
/// the last 60 s, one record per vehicle (newest), filtered by planar
/// distance, sorted ascending, capped at 100, joined with the public subset
/// of vehicle descriptors.
pub async fn get_nearby(
    State(state): State<AppState>,
    Query(q): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyEntry>>, AppError> {
    let radius_km = q.radius.min(NEARBY_MAX_RADIUS_KM).max(0.0);
    let since_ms = crate::now_ms().saturating_sub(NEARBY_WINDOW_MS);
    let recent = state.history.query_since(since_ms).await?;

    let mut newest_per_vehicle: std::collections::HashMap<String, Position> =
        std::collections::HashMap::new();
    for pos in recent {
        newest_per_vehicle
            .entry(pos.vehicle_id.clone())
            .and_modify(|existing| {
                if pos.timestamp_ms > existing.timestamp_ms {
                    *existing = pos.clone();
                }
            })
            .or_insert(pos);
    }

    let mut within_radius: Vec<(Position, f64)> = newest_per_vehicle
        .into_values()
        .filter_map(|pos| {
            let d = planar_distance_km(q.lat, q.lng, pos.lat, pos.lng);
            (d <= radius_km).then_some((pos, d))
        })
        .collect();
    within_radius.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    within_radius.truncate(NEARBY_CAP);

    let ids: Vec<String> = within_radius.iter().map(|(p, _)| p.vehicle_id.clone()).collect();
    let descriptors = state.vehicles.get_public_descriptors(&ids).await?;
    let by_id: std::collections::HashMap<String, VehicleDescriptor> =
        descriptors.into_iter().map(|d| (d.vehicle_id.clone(), d)).collect();

    let entries = within_radius
        .into_iter()
        .map(|(position, distance_km)| {
            let vehicle = by_id.get(&position.vehicle_id).cloned();
            NearbyEntry {
                position,
                distance_km,
                vehicle,
            }
        })
        .collect();

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use crate::cache::InMemoryCache;
    use crate::config::Config;
    use crate::domain::Position;
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

    fn pos(id: &str, lat: f64, lng: f64, ts: u64) -> Position {
        Position {
            vehicle_id: id.into(),
            lat,
            lng,
            speed: 0.0,
            heading: 0.0,
            accuracy: 0.0,
            altitude: 0.0,
            timestamp_ms: ts,
        }
    }

    #[tokio::test]
    async fn scenario_s5_cache_miss_falls_back_to_history() {
        let state = test_state();
        state.history.insert_one(&pos("veh_5", 12.97, 77.59, 1000)).await.unwrap();

        let Json(resp) = get_current(State(state.clone()), Path("veh_5".into())).await.unwrap();
        assert_eq!(resp.source, "history");

        let Json(resp2) = get_current(State(state), Path("veh_5".into())).await.unwrap();
        assert_eq!(resp2.source, "cache");
    }

    #[tokio::test]
    async fn get_current_not_found_when_absent_everywhere() {
        let state = test_state();
        let err = get_current(State(state), Path("ghost".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn scenario_s6_nearby_filters_by_radius() {
        let state = test_state();
        let now = crate::now_ms();
        // ~0.5km away
        state.history.insert_one(&pos("near", 0.0045, 0.0, now)).await.unwrap();
        // ~3km away
        state.history.insert_one(&pos("far", 0.027, 0.0, now)).await.unwrap();

        let Json(entries) = get_nearby(
            State(state),
            Query(NearbyQuery { lat: 0.0, lng: 0.0, radius: 1.0 }),
        )
        .await
        .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].position.vehicle_id, "near");
    }

    #[tokio::test]
    async fn nearby_sorted_ascending_by_distance() {
        let state = test_state();
        let now = crate::now_ms();
        state.history.insert_one(&pos("b", 0.009, 0.0, now)).await.unwrap();
        state.history.insert_one(&pos("a", 0.0009, 0.0, now)).await.unwrap();

        let Json(entries) = get_nearby(
            State(state),
            Query(NearbyQuery { lat: 0.0, lng: 0.0, radius: 5.0 }),
        )
        .await
        .unwrap();

        assert_eq!(entries[0].position.vehicle_id, "a");
        assert_eq!(entries[1].position.vehicle_id, "b");
    }
}
