// =============================================================================
// FLEETTRACK — Real-time fleet-telemetry ingestion & distribution backend
// =============================================================================
// Core pipeline (ingress → gate → hot cache → event log → persistence &
// fan-out → subscription broker) plus the thin HTTP/WS surface and the
// external-collaborator shims (auth, hazard/SOS intake) needed to exercise
// it end to end. See SPEC_FULL.md for the full component breakdown.
// =============================================================================

mod auth;
mod broker;
mod cache;
mod config;
mod domain;
mod error;
mod eventlog;
mod gate;
mod geo;
mod http;
mod metrics;
mod state;
mod store;
mod workers;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use broker::Broker;
use cache::{CacheBackend, HotCache, InMemoryCache, RedisCache};
use config::Config;
use eventlog::{EventLogBus, InMemoryEventLog, KafkaEventLog};
use metrics::Metrics;
use state::AppState;
use store::{HistoryStore, InMemoryStore, MongoStore, VehicleStore};
use tracing::{error, info, warn};

/// Current time in epoch milliseconds. Receive-time default for missing
/// timestamps (§4.G), and the basis for TTL/retention math throughout.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "fleettrack_server=info,tower_http=info".into()),
        )
        .json()
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[boot] configuration error: {e}");
            eprintln!("[boot] MONGO_URI is required — there is no fallback for the system of record.");
            std::process::exit(1);
        }
    };
    info!(port = config.port, "fleettrack starting");

    // Boot order: store → cache → event log → consumer workers → broker →
    // HTTP/WS listener (§9 design note, SPEC_FULL §2 "[AMBIENT] Process
    // bootstrap order"). Store connectivity is the only required leg.
    let history_store = match MongoStore::connect(&config.mongo_uri).await {
        Ok(s) => Arc::new(s) as Arc<dyn HistoryStore>,
        Err(e) => {
            eprintln!("[boot] failed to connect to MONGO_URI: {e}");
            std::process::exit(1);
        }
    };
    let vehicle_store = match MongoStore::connect(&config.mongo_uri).await {
        Ok(s) => Arc::new(s) as Arc<dyn VehicleStore>,
        Err(e) => {
            eprintln!("[boot] failed to connect to MONGO_URI: {e}");
            std::process::exit(1);
        }
    };

    let (cache, cache_backend): (Arc<dyn HotCache>, CacheBackend) = match &config.redis_url {
        Some(url) => match RedisCache::connect(url, config.cache_ttl).await {
            Ok(c) => (Arc::new(c), CacheBackend::Redis),
            Err(e) => {
                warn!(error = %e, "redis_unreachable_falling_back_to_memory");
                let mem = Arc::new(InMemoryCache::new(config.cache_ttl));
                mem.clone().spawn_janitor();
                (mem, CacheBackend::Memory)
            }
        },
        None => {
            let mem = Arc::new(InMemoryCache::new(config.cache_ttl));
            mem.clone().spawn_janitor();
            (mem, CacheBackend::Memory)
        }
    };

    let (log, log_available): (Arc<dyn EventLogBus>, bool) = match &config.kafka_brokers {
        Some(brokers) => match KafkaEventLog::connect(brokers) {
            Ok(l) => (Arc::new(l), true),
            Err(e) => {
                warn!(error = %e, "kafka_unreachable_falling_back_to_direct_write");
                (Arc::new(InMemoryEventLog::unavailable()), false)
            }
        },
        None => {
            info!("KAFKA_BROKERS unset — ingress falls through to direct-write for every accepted ping");
            (Arc::new(InMemoryEventLog::unavailable()), false)
        }
    };

    let broker = Broker::new();
    broker.spawn_sweeper();

    let metrics = Arc::new(Metrics::new());

    // Consumer workers (D, E, alert-processor) each join the log
    // independently (§4.C "all groups receive every record independently").
    {
        let log = log.clone();
        let history = history_store.clone();
        let vehicles = vehicle_store.clone();
        let broker_handle = broker::BrokerHandle::new(broker.clone());
        let metrics = metrics.clone();
        let batch_max_bytes = config.batch_max_bytes;
        tokio::spawn(async move {
            workers::run_persistence_worker(
                log,
                history,
                vehicles,
                broker_handle,
                metrics,
                batch_max_bytes,
            )
            .await;
        });
    }
    {
        let log = log.clone();
        let broker_handle = broker::BrokerHandle::new(broker.clone());
        let metrics = metrics.clone();
        let batch_max_bytes = config.batch_max_bytes;
        tokio::spawn(async move {
            workers::run_fanout_worker(log, broker_handle, metrics, batch_max_bytes).await;
        });
    }
    {
        let log = log.clone();
        let broker_handle = broker::BrokerHandle::new(broker.clone());
        let metrics = metrics.clone();
        tokio::spawn(async move {
            workers::run_alert_processor(log, broker_handle, metrics).await;
        });
    }

    // History retention sweep (§3 invariant 4, SPEC_FULL §4 "[SUPPLEMENT]
    // History retention sweep").
    {
        let history = history_store.clone();
        let retention = config.history_retention;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                let cutoff = now_ms().saturating_sub(retention.as_millis() as u64);
                match history.gc_older_than(cutoff).await {
                    Ok(n) if n > 0 => info!(reclaimed = n, "history_retention_gc"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "history_retention_gc_failed"),
                }
            }
        });
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        cache,
        cache_backend,
        log,
        log_available,
        history: history_store,
        vehicles: vehicle_store,
        broker,
        metrics,
    };

    let app = http::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[boot] could not bind port {}: {e}", config.port);
            eprintln!("[boot] the port is probably already in use; set PORT to pick another one.");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown");
    })
    .await
    {
        eprintln!("[boot] server error: {e}");
        std::process::exit(1);
    }
}
