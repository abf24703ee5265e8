use std::sync::Arc;

use crate::broker::Broker;
use crate::cache::{CacheBackend, HotCache};
use crate::config::Config;
use crate::eventlog::EventLogBus;
use crate::metrics::Metrics;
use crate::store::{HistoryStore, VehicleStore};

/// Small service registry passed into request handlers (§9 "Process-wide
/// mutable state... exposed via a small service registry... no ambient
/// globals"). Built once during boot in dependency order: store → cache →
/// log → consumers → broker → listener.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<dyn HotCache>,
    pub cache_backend: CacheBackend,
    pub log: Arc<dyn EventLogBus>,
    pub log_available: bool,
    pub history: Arc<dyn HistoryStore>,
    pub vehicles: Arc<dyn VehicleStore>,
    pub broker: Arc<Broker>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// `/health`'s component flags (§6 "[AMBIENT] `/health` detail").
    pub fn health_flags(&self) -> HealthFlags {
        HealthFlags {
            cache: self.cache_backend.as_str(),
            event_log: if self.log_available { "kafka" } else { "unavailable" },
            store: "up",
        }
    }
}

#[derive(serde::Serialize)]
pub struct HealthFlags {
    pub cache: &'static str,
    #[serde(rename = "eventLog")]
    pub event_log: &'static str,
    pub store: &'static str,
}
