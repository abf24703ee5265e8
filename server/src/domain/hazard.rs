use serde::{Deserialize, Serialize};

/// Hazard kind tag (§3 "Hazard report"). The core treats the payload as
/// opaque beyond this tag and the fields needed to route it; scoring,
/// moderation, and geocoding are the external hazard-report feature's job
/// (§1 Out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Accident,
    Traffic,
    Construction,
    Pothole,
    Harassment,
    Flooding,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

const DEFAULT_EXPIRY_HOURS: i64 = 6;

/// A geotagged advisory, broadcast via the broker but never interpreted by
/// the core beyond its routing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardReport {
    pub id: String,
    pub kind: HazardKind,
    pub severity: Severity,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub reporter_id: Option<String>,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
}

impl HazardReport {
    pub fn default_expiry_ms(created_at_ms: u64) -> u64 {
        created_at_ms + (DEFAULT_EXPIRY_HOURS as u64) * 3_600_000
    }
}

/// A one-time emergency signal (§3 SOS event, SPEC_FULL §3 supplement).
/// Gated by a per-user credit counter and a per-IP 24h limiter (§7) before
/// it ever reaches this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SosEvent {
    pub vehicle_id: String,
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub message: String,
    pub created_at_ms: u64,
}
