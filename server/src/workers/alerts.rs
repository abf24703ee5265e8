use std::sync::Arc;

use crate::broker::{BrokerHandle, ServerEvent};
use crate::domain::{HazardReport, Room};
use crate::eventlog::{EventLogBus, LogConsumer, Topic, VehicleEvent};
use crate::metrics::Metrics;

/// `alert-processor` (§4.E, SPEC_FULL §3 SOS event): consumes both
/// `route-alerts` and `vehicle-events` and pushes each record to
/// `nearby-all` with no coalescing — unlike vehicle positions, every alert
/// or SOS signal is individually meaningful and must reach subscribers. The
/// two topics are independent partition sets, so this runs one poll loop
/// per topic, both under the `alert-processor` consumer group name.
pub async fn run_alert_processor(log: Arc<dyn EventLogBus>, broker: BrokerHandle, metrics: Arc<Metrics>) {
    let route_alerts = log.consumer("alert-processor", Topic::RouteAlerts);
    let vehicle_events = log.consumer("alert-processor", Topic::VehicleEvents);
    tokio::join!(
        run_route_alerts(route_alerts, broker.clone(), metrics.clone()),
        run_vehicle_events(vehicle_events, broker, metrics),
    );
}

async fn run_route_alerts(mut consumer: Box<dyn LogConsumer>, broker: BrokerHandle, metrics: Arc<Metrics>) {
    loop {
        let batch = match consumer.fetch_batch(1024 * 1024).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "alert_fetch_failed");
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                continue;
            }
        };
        if batch.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            continue;
        }

        for record in &batch {
            match serde_json::from_slice::<HazardReport>(&record.payload) {
                Ok(hazard) => {
                    broker.push_to_room(&Room::NearbyAll, ServerEvent::RouteAlert(hazard));
                    metrics.incr_alerts_relayed();
                }
                Err(e) => tracing::warn!(error = %e, "alert_parse_failed"),
            }
        }

        if let Err(e) = consumer.commit(&batch).await {
            tracing::error!(error = %e, "alert_commit_failed");
        }
    }
}

async fn run_vehicle_events(mut consumer: Box<dyn LogConsumer>, broker: BrokerHandle, metrics: Arc<Metrics>) {
    loop {
        let batch = match consumer.fetch_batch(1024 * 1024).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "vehicle_events_fetch_failed");
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                continue;
            }
        };
        if batch.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            continue;
        }

        for record in &batch {
            match serde_json::from_slice::<VehicleEvent>(&record.payload) {
                Ok(VehicleEvent::Sos(event)) => {
                    broker.push_to_room(&Room::NearbyAll, ServerEvent::SosAlert(event));
                    metrics.incr_alerts_relayed();
                }
                // Status transitions are pushed directly from the persistence
                // worker, which already holds the broker handle and the
                // distinct vehicle_id set — nothing publishes this variant
                // today, but a future publisher only needs this arm filled in.
                Ok(VehicleEvent::StatusChanged { vehicle_id, status }) => {
                    broker.push_to_room(
                        &Room::Vehicle(vehicle_id.clone()),
                        ServerEvent::StatusChanged { vehicle_id, status: status.as_str() },
                    );
                }
                Err(e) => tracing::warn!(error = %e, "vehicle_event_parse_failed"),
            }
        }

        if let Err(e) = consumer.commit(&batch).await {
            tracing::error!(error = %e, "vehicle_events_commit_failed");
        }
    }
}
