use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::Position;
use crate::geo::{meters_to_km, planar_distance_km};

use super::HotCache;

struct PositionEntry {
    pos: Position,
    inserted_at: Instant,
}

struct ThrottleEntry {
    count: u32,
    window_start: Instant,
}

/// Process-local fallback for the hot cache (§4.A "In-process fallback").
/// Used when `REDIS_URL` is unset or the remote cache is unreachable.
/// Satisfies the same contract as `RedisCache`, with TTL expiry enforced
/// per-process rather than by the remote store.
pub struct InMemoryCache {
    positions: DashMap<String, PositionEntry>,
    throttle: DashMap<String, ThrottleEntry>,
    ttl: Duration,
}

impl InMemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            positions: DashMap::new(),
            throttle: DashMap::new(),
            ttl,
        }
    }

    /// Background sweep reclaiming expired entries, mirroring the teacher's
    /// `eviction` task. Runs for the lifetime of the process.
    pub fn spawn_janitor(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let before = self.positions.len();
                let ttl = self.ttl;
                self.positions
                    .retain(|_, e| e.inserted_at.elapsed() < ttl);
                self.throttle
                    .retain(|_, e| e.window_start.elapsed() < ttl);
                let after = self.positions.len();
                if before != after {
                    tracing::info!(evicted = before - after, remaining = after, "cache_eviction");
                }
            }
        })
    }
}

#[async_trait]
impl HotCache for InMemoryCache {
    async fn put(&self, vehicle_id: &str, pos: &Position) -> anyhow::Result<()> {
        // §3 invariant 1: never let an older timestamp clobber a newer one
        // for the same vehicle. `DashMap::entry` holds the shard lock across
        // the read-compare-write, so this is race-free against concurrent
        // puts for the same key.
        self.positions
            .entry(vehicle_id.to_string())
            .and_modify(|e| {
                if pos.timestamp_ms >= e.pos.timestamp_ms {
                    e.pos = pos.clone();
                    e.inserted_at = Instant::now();
                }
            })
            .or_insert_with(|| PositionEntry {
                pos: pos.clone(),
                inserted_at: Instant::now(),
            });
        Ok(())
    }

    async fn get(&self, vehicle_id: &str) -> anyhow::Result<Option<Position>> {
        match self.positions.get(vehicle_id) {
            Some(e) if e.inserted_at.elapsed() < self.ttl => Ok(Some(e.pos.clone())),
            _ => Ok(None),
        }
    }

    async fn put_batch(&self, positions: &[Position]) -> anyhow::Result<()> {
        let now = Instant::now();
        for pos in positions {
            self.positions
                .entry(pos.vehicle_id.clone())
                .and_modify(|e| {
                    if pos.timestamp_ms >= e.pos.timestamp_ms {
                        e.pos = pos.clone();
                        e.inserted_at = now;
                    }
                })
                .or_insert_with(|| PositionEntry {
                    pos: pos.clone(),
                    inserted_at: now,
                });
        }
        Ok(())
    }

    async fn incr_throttle(&self, vehicle_id: &str, window: Duration) -> anyhow::Result<u64> {
        let mut entry = self
            .throttle
            .entry(vehicle_id.to_string())
            .or_insert_with(|| ThrottleEntry {
                count: 0,
                window_start: Instant::now(),
            });
        if entry.window_start.elapsed() > window {
            entry.count = 1;
            entry.window_start = Instant::now();
        } else {
            entry.count += 1;
        }
        Ok(entry.count as u64)
    }

    async fn has_moved(
        &self,
        vehicle_id: &str,
        lat: f64,
        lng: f64,
        min_m: f64,
    ) -> anyhow::Result<bool> {
        let prior = match self.positions.get(vehicle_id) {
            Some(e) if e.inserted_at.elapsed() < self.ttl => Some(e.pos.clone()),
            _ => None,
        };
        Ok(match prior {
            None => true,
            Some(p) => planar_distance_km(p.lat, p.lng, lat, lng) >= meters_to_km(min_m),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(vehicle_id: &str, lat: f64, lng: f64, ts: u64) -> Position {
        Position {
            vehicle_id: vehicle_id.into(),
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
    async fn put_then_get_roundtrips() {
        let c = InMemoryCache::new(Duration::from_secs(300));
        c.put("veh_1", &pos("veh_1", 1.0, 2.0, 100)).await.unwrap();
        let got = c.get("veh_1").await.unwrap().unwrap();
        assert_eq!(got.lat, 1.0);
    }

    #[tokio::test]
    async fn get_on_miss_returns_none() {
        let c = InMemoryCache::new(Duration::from_secs(300));
        assert!(c.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn has_moved_true_when_no_prior_entry() {
        let c = InMemoryCache::new(Duration::from_secs(300));
        assert!(c.has_moved("veh_1", 1.0, 2.0, 10.0).await.unwrap());
    }

    #[tokio::test]
    async fn has_moved_false_within_dead_zone() {
        let c = InMemoryCache::new(Duration::from_secs(300));
        c.put("veh_1", &pos("veh_1", 12.97, 77.59, 100)).await.unwrap();
        // same point — well within 10m
        let moved = c.has_moved("veh_1", 12.97, 77.59, 10.0).await.unwrap();
        assert!(!moved);
    }

    #[tokio::test]
    async fn has_moved_true_outside_dead_zone() {
        let c = InMemoryCache::new(Duration::from_secs(300));
        c.put("veh_1", &pos("veh_1", 12.97, 77.59, 100)).await.unwrap();
        // ~1km away
        let moved = c.has_moved("veh_1", 12.98, 77.59, 10.0).await.unwrap();
        assert!(moved);
    }

    #[tokio::test]
    async fn throttle_counts_up_within_window() {
        let c = InMemoryCache::new(Duration::from_secs(300));
        for expected in 1..=5u64 {
            let n = c
                .incr_throttle("veh_x", Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(n, expected);
        }
        let sixth = c.incr_throttle("veh_x", Duration::from_secs(1)).await.unwrap();
        assert_eq!(sixth, 6);
    }

    #[tokio::test]
    async fn invariant_1_older_timestamp_does_not_clobber_newer() {
        let c = InMemoryCache::new(Duration::from_secs(300));
        c.put("veh_1", &pos("veh_1", 12.97, 77.59, 100)).await.unwrap();
        c.put("veh_1", &pos("veh_1", 1.0, 1.0, 50)).await.unwrap();
        let got = c.get("veh_1").await.unwrap().unwrap();
        assert_eq!(got.timestamp_ms, 100, "older write must not overwrite newer");
        assert_eq!(got.lat, 12.97);
    }

    #[tokio::test]
    async fn put_batch_is_visible_to_subsequent_gets() {
        let c = InMemoryCache::new(Duration::from_secs(300));
        let batch = vec![pos("a", 1.0, 1.0, 1), pos("b", 2.0, 2.0, 2)];
        c.put_batch(&batch).await.unwrap();
        assert!(c.get("a").await.unwrap().is_some());
        assert!(c.get("b").await.unwrap().is_some());
    }
}
