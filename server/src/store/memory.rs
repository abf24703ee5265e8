use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::vehicle::VehicleStatus;
use crate::domain::{Position, VehicleDescriptor};

use super::{HistoryStore, VehicleStore};

/// In-process fake satisfying `HistoryStore` + `VehicleStore`, used by the
/// scenario tests in SPEC_FULL.md §8's "[AMBIENT] Test tooling" note — the
/// crate cannot assume a live Mongo in CI, so handler-level tests exercise
/// this fake behind the same traits production code uses.
#[derive(Default)]
pub struct InMemoryStore {
    positions: Mutex<Vec<Position>>,
    vehicles: Mutex<Vec<VehicleDescriptor>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_vehicle(&self, descriptor: VehicleDescriptor) {
        self.vehicles.lock().unwrap().push(descriptor);
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn insert_many(&self, positions: &[Position]) -> anyhow::Result<()> {
        let mut store = self.positions.lock().unwrap();
        for p in positions {
            // Unique-key conflicts ignored per §7: here the analogous
            // uniqueness is (vehicle_id, timestamp_ms).
            if !store
                .iter()
                .any(|e| e.vehicle_id == p.vehicle_id && e.timestamp_ms == p.timestamp_ms)
            {
                store.push(p.clone());
            }
        }
        Ok(())
    }

    async fn insert_one(&self, position: &Position) -> anyhow::Result<()> {
        self.positions.lock().unwrap().push(position.clone());
        Ok(())
    }

    async fn query_current(&self, vehicle_id: &str) -> anyhow::Result<Option<Position>> {
        let store = self.positions.lock().unwrap();
        Ok(store
            .iter()
            .filter(|p| p.vehicle_id == vehicle_id)
            .max_by_key(|p| p.timestamp_ms)
            .cloned())
    }

    async fn query_history(
        &self,
        vehicle_id: &str,
        from_ms: Option<u64>,
        to_ms: Option<u64>,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<Vec<Position>> {
        let limit = limit.min(1000) as usize;
        let store = self.positions.lock().unwrap();
        let mut matching: Vec<Position> = store
            .iter()
            .filter(|p| p.vehicle_id == vehicle_id)
            .filter(|p| from_ms.map_or(true, |f| p.timestamp_ms >= f))
            .filter(|p| to_ms.map_or(true, |t| p.timestamp_ms <= t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        let start = (page as usize) * limit;
        Ok(matching.into_iter().skip(start).take(limit).collect())
    }

    async fn query_since(&self, since_ms: u64) -> anyhow::Result<Vec<Position>> {
        let store = self.positions.lock().unwrap();
        Ok(store
            .iter()
            .filter(|p| p.timestamp_ms >= since_ms)
            .cloned()
            .collect())
    }

    async fn gc_older_than(&self, cutoff_ms: u64) -> anyhow::Result<u64> {
        let mut store = self.positions.lock().unwrap();
        let before = store.len();
        store.retain(|p| p.timestamp_ms >= cutoff_ms);
        Ok((before - store.len()) as u64)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl VehicleStore for InMemoryStore {
    async fn update_status_and_last_seen(
        &self,
        vehicle_ids: &[String],
        status: VehicleStatus,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        let mut vehicles = self.vehicles.lock().unwrap();
        for id in vehicle_ids {
            if let Some(v) = vehicles.iter_mut().find(|v| &v.vehicle_id == id) {
                v.status = status;
                v.last_seen_ms = now_ms;
            } else {
                vehicles.push(VehicleDescriptor {
                    vehicle_id: id.clone(),
                    owner_id: String::new(),
                    is_public: true,
                    status,
                    last_seen_ms: now_ms,
                });
            }
        }
        Ok(())
    }

    async fn get_public_descriptors(
        &self,
        vehicle_ids: &[String],
    ) -> anyhow::Result<Vec<VehicleDescriptor>> {
        let vehicles = self.vehicles.lock().unwrap();
        Ok(vehicles
            .iter()
            .filter(|v| vehicle_ids.contains(&v.vehicle_id) && v.is_public)
            .cloned()
            .collect())
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
    async fn query_current_returns_newest() {
        let store = InMemoryStore::new();
        store.insert_many(&[pos("a", 1.0, 1.0, 10), pos("a", 2.0, 2.0, 20)]).await.unwrap();
        let current = store.query_current("a").await.unwrap().unwrap();
        assert_eq!(current.timestamp_ms, 20);
    }

    #[tokio::test]
    async fn history_is_reverse_chronological_and_paginated() {
        let store = InMemoryStore::new();
        for i in 0..5u64 {
            store.insert_one(&pos("a", 0.0, 0.0, i * 10)).await.unwrap();
        }
        let page0 = store.query_history("a", None, None, 0, 2).await.unwrap();
        assert_eq!(page0.iter().map(|p| p.timestamp_ms).collect::<Vec<_>>(), vec![40, 30]);
        let page1 = store.query_history("a", None, None, 1, 2).await.unwrap();
        assert_eq!(page1.iter().map(|p| p.timestamp_ms).collect::<Vec<_>>(), vec![20, 10]);
    }

    #[tokio::test]
    async fn gc_reclaims_only_older_than_cutoff() {
        let store = InMemoryStore::new();
        store.insert_many(&[pos("a", 0.0, 0.0, 10), pos("a", 0.0, 0.0, 1000)]).await.unwrap();
        let reclaimed = store.gc_older_than(500).await.unwrap();
        assert_eq!(reclaimed, 1);
        assert_eq!(store.query_history("a", None, None, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_key_insert_is_ignored() {
        let store = InMemoryStore::new();
        store.insert_many(&[pos("a", 1.0, 1.0, 10)]).await.unwrap();
        store.insert_many(&[pos("a", 9.0, 9.0, 10)]).await.unwrap();
        assert_eq!(store.query_history("a", None, None, 0, 10).await.unwrap().len(), 1);
    }
}
