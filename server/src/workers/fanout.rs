use std::collections::HashMap;
use std::sync::Arc;

use crate::broker::{BrokerHandle, NearbySummary, ServerEvent};
use crate::domain::{Position, Room};
use crate::eventlog::{EventLogBus, Topic};
use crate::metrics::Metrics;

/// Consumer group `websocket-fanout` (§4.E). Subscribes to
/// `vehicle-locations`; per batch, coalesces to one record per vehicle
/// before emitting, decoupling subscriber fan-out cost from ingest rate.
pub async fn run_fanout_worker(
    log: Arc<dyn EventLogBus>,
    broker: BrokerHandle,
    metrics: Arc<Metrics>,
    batch_max_bytes: usize,
) {
    let mut consumer = log.consumer("websocket-fanout", Topic::VehicleLocations);
    loop {
        let batch = match consumer.fetch_batch(batch_max_bytes).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "fanout_fetch_failed");
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                continue;
            }
        };
        if batch.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            continue;
        }

        // Build vehicle_id -> latest Position by iterating in offset order;
        // later records overwrite earlier ones (§4.E step 1, Glossary
        // "Coalescing").
        let mut latest: HashMap<String, Position> = HashMap::new();
        for record in &batch {
            match serde_json::from_slice::<Position>(&record.payload) {
                Ok(pos) => {
                    latest.insert(pos.vehicle_id.clone(), pos);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "fanout_parse_failed");
                }
            }
        }

        for pos in latest.values() {
            broker.push_to_room(
                &Room::Vehicle(pos.vehicle_id.clone()),
                ServerEvent::VehicleMoved(pos.clone()),
            );
        }
        metrics.add_fanout_pushed(latest.len() as u64);

        if !latest.is_empty() {
            let summary: Vec<NearbySummary> = latest.values().map(NearbySummary::from).collect();
            broker.push_to_room(&Room::NearbyAll, ServerEvent::BatchMoved(summary));
        }

        metrics.incr_fanout_batches();
        tracing::debug!(batch = batch.len(), coalesced = latest.len(), "fanout_heartbeat");

        if let Err(e) = consumer.commit(&batch).await {
            tracing::error!(error = %e, "fanout_commit_failed");
        }
    }
}

// `alert-processor` (§4.E) lives in `alerts.rs` — a parallel worker
// consuming `route-alerts` with no coalescing, since alerts are
// individually meaningful.
