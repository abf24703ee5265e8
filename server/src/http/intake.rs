use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::{HazardKind, HazardReport, Room, Severity, SosEvent};
use crate::error::AppError;
use crate::eventlog::{Topic, VehicleEvent};
use crate::state::AppState;

/// Per-user SOS credits issued per rolling day, and the per-IP limiter
/// window (§7 "gated both by a per-user credit counter... and a per-IP 24h
/// limiter"). Both are implemented against the hot cache's `incr_throttle`
/// primitive with a long window rather than a bespoke counter store — the
/// same fail-open semantics as the ingress gate apply here.
const SOS_CREDIT_MAX_PER_DAY: u64 = 3;
const SOS_IP_LIMIT_WINDOW: Duration = Duration::from_secs(24 * 3600);
const SOS_IP_LIMIT_MAX: u64 = 1;

#[derive(Debug, Deserialize)]
pub struct ReportBody {
    pub kind: HazardKind,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub reporter_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub id: String,
}

/// POST `/api/reports` (§6, §1 "Out of scope... the hazard-report and
/// route-suggestion feature logic"). This shim does the minimum the core
/// must do to make the route functional: validate shape, publish an opaque
/// payload onto `route-alerts`. Scoring, geocoding, and moderation are the
/// external feature's job.
pub async fn submit_report(
    State(state): State<AppState>,
    Json(body): Json<ReportBody>,
) -> Result<Json<ReportResponse>, AppError> {
    if !(-90.0..=90.0).contains(&body.lat) || !(-180.0..=180.0).contains(&body.lng) {
        return Err(AppError::Validation {
            details: vec!["lat/lng out of range".to_string()],
        });
    }

    let now_ms = crate::now_ms();
    let report = HazardReport {
        id: uuid::Uuid::new_v4().to_string(),
        kind: body.kind,
        severity: body.severity.unwrap_or(Severity::Medium),
        lat: body.lat,
        lng: body.lng,
        reporter_id: body.reporter_id,
        created_at_ms: now_ms,
        expires_at_ms: HazardReport::default_expiry_ms(now_ms),
    };

    let payload = serde_json::to_vec(&report).map_err(|e| AppError::Internal(e.to_string()))?;
    let published = state.log.publish(Topic::RouteAlerts, "hazard", &payload).await;
    if !published {
        // No direct-write path for hazards (they have no system-of-record
        // table in this core); broadcast inline so subscribers still see it
        // promptly even though `alert-processor` never will.
        state
            .broker
            .push_to_room(&Room::NearbyAll, crate::broker::ServerEvent::NewHazard(report.clone()));
    }

    Ok(Json(ReportResponse { id: report.id }))
}

#[derive(Debug, Deserialize)]
pub struct SosBody {
    pub vehicle_id: String,
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SosResponse {
    pub accepted: bool,
}

/// POST `/api/sos` (§7 "one-time emergency signal"). Gated by a per-user
/// credit counter (atomic decrement) and a per-IP 24h limiter; exhaustion
/// returns `SOS_CREDIT_EXHAUSTED` / 403.
pub async fn submit_sos(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<SosBody>,
) -> Result<Json<SosResponse>, AppError> {
    let credit_key = format!("sos_credit:{}", body.user_id);
    let used = state
        .cache
        .incr_throttle(&credit_key, Duration::from_secs(24 * 3600))
        .await
        .unwrap_or(0); // fail-open, matching §4.A's throttle policy
    if used > SOS_CREDIT_MAX_PER_DAY {
        state.metrics.incr_sos_credit_exhausted();
        return Err(AppError::Forbidden {
            code: Some("SOS_CREDIT_EXHAUSTED"),
        });
    }

    let ip_key = format!("sos_ip:{}", addr.ip());
    let ip_uses = state
        .cache
        .incr_throttle(&ip_key, SOS_IP_LIMIT_WINDOW)
        .await
        .unwrap_or(0);
    if ip_uses > SOS_IP_LIMIT_MAX {
        state.metrics.incr_sos_credit_exhausted();
        return Err(AppError::Forbidden {
            code: Some("SOS_CREDIT_EXHAUSTED"),
        });
    }

    let now_ms = crate::now_ms();
    let event = SosEvent {
        vehicle_id: body.vehicle_id,
        user_id: body.user_id,
        lat: body.lat,
        lng: body.lng,
        message: body.message,
        created_at_ms: now_ms,
    };

    let envelope = VehicleEvent::Sos(event.clone());
    let payload = serde_json::to_vec(&envelope).map_err(|e| AppError::Internal(e.to_string()))?;
    let published = state.log.publish(Topic::VehicleEvents, "sos", &payload).await;
    if !published {
        state
            .broker
            .push_to_room(&Room::NearbyAll, crate::broker::ServerEvent::SosAlert(event));
    }

    Ok(Json(SosResponse { accepted: true }))
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
    use std::time::Duration as StdDuration;

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
                cache_ttl: StdDuration::from_secs(300),
                throttle_window: StdDuration::from_secs(1),
                throttle_max: 5,
                dead_zone_min_m: 10.0,
                history_retention: StdDuration::from_secs(30 * 24 * 3600),
                batch_max_bytes: 1024 * 1024,
                ingest_deadline: StdDuration::from_secs(2),
            }),
            cache: Arc::new(InMemoryCache::new(StdDuration::from_secs(300))),
            cache_backend: crate::cache::CacheBackend::Memory,
            log: Arc::new(InMemoryEventLog::new()),
            log_available: true,
            history: Arc::new(InMemoryStore::new()),
            vehicles: Arc::new(InMemoryStore::new()),
            broker: Broker::new(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    #[tokio::test]
    async fn report_out_of_range_is_rejected() {
        let state = test_state();
        let body = ReportBody {
            kind: HazardKind::Pothole,
            severity: None,
            lat: 999.0,
            lng: 0.0,
            reporter_id: None,
        };
        let err = submit_report(State(state), Json(body)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn sos_fourth_request_in_a_day_is_credit_exhausted() {
        // Each call uses a distinct source IP so the per-IP limiter (1/day)
        // never trips first — this test isolates the per-user credit limit.
        let state = test_state();
        for i in 0..3u8 {
            let addr: SocketAddr = format!("10.0.0.{}:0", i + 1).parse().unwrap();
            let body = SosBody {
                vehicle_id: format!("veh_{i}"),
                user_id: "user_1".into(),
                lat: 0.0,
                lng: 0.0,
                message: String::new(),
            };
            submit_sos(State(state.clone()), ConnectInfo(addr), Json(body))
                .await
                .unwrap();
        }
        let fourth = SosBody {
            vehicle_id: "veh_x".into(),
            user_id: "user_1".into(),
            lat: 0.0,
            lng: 0.0,
            message: String::new(),
        };
        let addr: SocketAddr = "10.0.0.99:0".parse().unwrap();
        let err = submit_sos(State(state), ConnectInfo(addr), Json(fourth))
            .await
            .unwrap_err();
        match err {
            AppError::Forbidden { code: Some("SOS_CREDIT_EXHAUSTED") } => {}
            other => panic!("expected SOS_CREDIT_EXHAUSTED, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sos_same_ip_twice_in_a_day_is_blocked_by_ip_limiter() {
        let state = test_state();
        let addr: SocketAddr = "10.1.0.1:0".parse().unwrap();
        let first = SosBody {
            vehicle_id: "veh_a".into(),
            user_id: "user_a".into(),
            lat: 0.0,
            lng: 0.0,
            message: String::new(),
        };
        submit_sos(State(state.clone()), ConnectInfo(addr), Json(first))
            .await
            .unwrap();

        let second = SosBody {
            vehicle_id: "veh_b".into(),
            user_id: "user_b".into(),
            lat: 0.0,
            lng: 0.0,
            message: String::new(),
        };
        let err = submit_sos(State(state), ConnectInfo(addr), Json(second))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Forbidden { code: Some("SOS_CREDIT_EXHAUSTED") }
        ));
    }
}
