use serde::{Deserialize, Serialize};

/// Vehicle status as observed by the ingest path. CRUD on the full
/// descriptor (plate, type, owner transfer, …) is owned by an external
/// collaborator (§1); the core only ever writes `status` and `last_seen` as
/// a side effect of accepting a ping (§3 "Vehicle descriptor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Active,
    Idle,
    Offline,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Active => "active",
            VehicleStatus::Idle => "idle",
            VehicleStatus::Offline => "offline",
        }
    }
}

/// The subset of the vehicle descriptor the core reads. Fields beyond this
/// (plate, type, registration, …) live in the external collaborator's store
/// and are never touched here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleDescriptor {
    pub vehicle_id: String,
    pub owner_id: String,
    pub is_public: bool,
    pub status: VehicleStatus,
    pub last_seen_ms: u64,
}
