pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;

use crate::domain::Position;

pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

/// Hot cache capability (§4.A). One trait, two implementations selected at
/// boot (§9 design note) — the remote `RedisCache` and the process-local
/// `InMemoryCache` fallback satisfy the identical surface so the rest of the
/// pipeline never branches on which one is active.
///
/// Failure semantics are the caller's responsibility (§4.A): throttle reads
/// fail-open, movement checks fail-true, writes fail-silent. This trait
/// simply reports success/failure; callers decide what "permit" means.
#[async_trait]
pub trait HotCache: Send + Sync {
    /// Set with TTL. Must be a fast single round-trip equivalent.
    async fn put(&self, vehicle_id: &str, pos: &Position) -> anyhow::Result<()>;

    /// Read the last-known position, if present and unexpired.
    async fn get(&self, vehicle_id: &str) -> anyhow::Result<Option<Position>>;

    /// Pipelined bulk write — must complete in a bounded number of
    /// round-trips irrespective of batch size.
    async fn put_batch(&self, positions: &[Position]) -> anyhow::Result<()>;

    /// Atomic counter with first-write TTL equal to `window`, used by the
    /// throttle gate (§4.B). Returns the post-increment count.
    async fn incr_throttle(
        &self,
        vehicle_id: &str,
        window: std::time::Duration,
    ) -> anyhow::Result<u64>;

    /// True if there is no prior entry, or the prior entry is farther than
    /// `min_m` metres from `(lat, lng)` (§4.B dead-zone check).
    async fn has_moved(
        &self,
        vehicle_id: &str,
        lat: f64,
        lng: f64,
        min_m: f64,
    ) -> anyhow::Result<bool>;
}

/// Which cache backend is currently active, for `/health`'s component flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBackend::Redis => "redis",
            CacheBackend::Memory => "memory",
        }
    }
}
