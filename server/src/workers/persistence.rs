use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashSet;

use crate::broker::{BrokerHandle, ServerEvent};
use crate::domain::vehicle::VehicleStatus;
use crate::domain::{Position, Room};
use crate::eventlog::{EventLogBus, Topic};
use crate::metrics::Metrics;
use crate::store::{HistoryStore, VehicleStore};

/// Consumer group `location-db-writer` (§4.D). Subscribes to
/// `vehicle-locations` and processes per-partition batches to amortize I/O.
pub async fn run_persistence_worker(
    log: Arc<dyn EventLogBus>,
    history: Arc<dyn HistoryStore>,
    vehicles: Arc<dyn VehicleStore>,
    broker: BrokerHandle,
    metrics: Arc<Metrics>,
    batch_max_bytes: usize,
) {
    let mut consumer = log.consumer("location-db-writer", Topic::VehicleLocations);
    // Vehicles this process has already observed as active — a ping from a
    // vehicle not yet in this set is this process's only signal of a
    // `status-changed` transition (§6 socket event list), since full
    // descriptor CRUD including idle/offline timeouts lives in an external
    // collaborator (§1). Process-local by the same reasoning as the broker
    // itself (§9 "cross-worker room sharing") — it resets on restart, which
    // just means every vehicle re-announces its first ping after a deploy.
    let known_active: DashSet<String> = DashSet::new();
    loop {
        let batch = match consumer.fetch_batch(batch_max_bytes).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "persistence_fetch_failed");
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                continue;
            }
        };
        if batch.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            continue;
        }

        let mut parsed = Vec::with_capacity(batch.len());
        for record in &batch {
            match serde_json::from_slice::<Position>(&record.payload) {
                Ok(pos) => parsed.push(pos),
                Err(e) => {
                    // Log and skip — the record's offset still advances at
                    // commit time (§4.D step 2).
                    metrics.incr_persist_parse_failed();
                    tracing::warn!(error = %e, "persist_parse_failed");
                }
            }
        }

        if !parsed.is_empty() {
            // Insert many, unordered — partial success and duplicate-key
            // conflicts are non-fatal (§4.D step 3).
            match history.insert_many(&parsed).await {
                Ok(()) => metrics.add_persisted(parsed.len() as u64),
                Err(e) => {
                    metrics.incr_persist_write_failed();
                    tracing::error!(error = %e, count = parsed.len(), "persist_write_failed");
                }
            }

            let distinct: HashSet<&str> = parsed.iter().map(|p| p.vehicle_id.as_str()).collect();
            let ids: Vec<String> = distinct.into_iter().map(String::from).collect();
            let now_ms = crate::now_ms();
            if let Err(e) = vehicles
                .update_status_and_last_seen(&ids, VehicleStatus::Active, now_ms)
                .await
            {
                tracing::warn!(error = %e, "descriptor_update_failed");
            } else {
                for vehicle_id in &ids {
                    if known_active.insert(vehicle_id.clone()) {
                        broker.push_to_room(
                            &Room::Vehicle(vehicle_id.clone()),
                            ServerEvent::StatusChanged {
                                vehicle_id: vehicle_id.clone(),
                                status: "active",
                            },
                        );
                    }
                }
            }
        }

        // Liveness heartbeat (§4.D step 4).
        tracing::debug!(batch = batch.len(), parsed = parsed.len(), "persistence_heartbeat");

        // Advance offsets for all successfully-parsed records regardless of
        // write outcome — records whose writes failed are effectively lost
        // beyond this point (§4.D step 5, §7).
        if let Err(e) = consumer.commit(&batch).await {
            tracing::error!(error = %e, "persistence_commit_failed");
        }
    }
}
