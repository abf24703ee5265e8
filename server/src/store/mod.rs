pub mod memory;
pub mod mongo;

use async_trait::async_trait;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

use crate::domain::{Position, VehicleDescriptor};

/// History store capability (§4.D / §4.H). The system of record for
/// positional history; unlike the cache and event log there is no fallback
/// — `MONGO_URI` is required at boot (spec.md §6).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Unordered bulk insert; partial success and duplicate-key conflicts
    /// are non-fatal (§4.D step 3, §7 "unique-key conflicts within a batch
    /// are ignored").
    async fn insert_many(&self, positions: &[Position]) -> anyhow::Result<()>;

    /// Single-record insert for the direct-write fallback (§4.D-direct).
    async fn insert_one(&self, position: &Position) -> anyhow::Result<()>;

    /// Newest record for a vehicle, used by the cache-miss read path (§4.H).
    async fn query_current(&self, vehicle_id: &str) -> anyhow::Result<Option<Position>>;

    /// Paginated, reverse-chronological history (§4.H `get_history`).
    async fn query_history(
        &self,
        vehicle_id: &str,
        from_ms: Option<u64>,
        to_ms: Option<u64>,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<Vec<Position>>;

    /// Most recent position per vehicle across the whole fleet within the
    /// last `since_ms` window (§4.H `get_nearby`'s "last 60 s of history").
    async fn query_since(&self, since_ms: u64) -> anyhow::Result<Vec<Position>>;

    /// Reclaim positions older than the retention window (§3 invariant 4).
    async fn gc_older_than(&self, cutoff_ms: u64) -> anyhow::Result<u64>;

    /// Cheap reachability check for `/ready` — there is no fallback for the
    /// system of record, so readiness reduces to "is the store answering."
    async fn ping(&self) -> anyhow::Result<()>;
}

/// Vehicle descriptor capability (§4.D step 3, §4.H `get_nearby`'s public
/// join). Full CRUD lives in an external collaborator (§1); the core only
/// ever touches these two operations.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn update_status_and_last_seen(
        &self,
        vehicle_ids: &[String],
        status: crate::domain::vehicle::VehicleStatus,
        now_ms: u64,
    ) -> anyhow::Result<()>;

    async fn get_public_descriptors(
        &self,
        vehicle_ids: &[String],
    ) -> anyhow::Result<Vec<VehicleDescriptor>>;
}
