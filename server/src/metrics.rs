use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Full structured observability counters (carried over from the teacher's
/// C4 design note: every accept/reject/drop path increments exactly one of
/// these, and `/metrics` + `/health` both read from the same struct).
#[derive(Default)]
pub struct Metrics {
    pub ingested: AtomicU64,
    pub throttled: AtomicU64,
    pub no_motion: AtomicU64,
    pub accepted_forward: AtomicU64,
    pub cache_write_failed: AtomicU64,
    pub log_publish_failed: AtomicU64,
    pub direct_write_fallback: AtomicU64,
    pub direct_write_failed: AtomicU64,
    pub persisted: AtomicU64,
    pub persist_parse_failed: AtomicU64,
    pub persist_write_failed: AtomicU64,
    pub fanout_batches: AtomicU64,
    pub fanout_pushed: AtomicU64,
    pub alerts_relayed: AtomicU64,
    pub sos_credit_exhausted: AtomicU64,
    pub socket_sessions_opened: AtomicU64,
    pub socket_sessions_closed: AtomicU64,
    pub socket_messages_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_ingested(&self) {
        Self::incr(&self.ingested);
    }
    pub fn incr_throttled(&self) {
        Self::incr(&self.throttled);
    }
    pub fn incr_no_motion(&self) {
        Self::incr(&self.no_motion);
    }
    pub fn incr_accepted_forward(&self) {
        Self::incr(&self.accepted_forward);
    }
    pub fn incr_cache_write_failed(&self) {
        Self::incr(&self.cache_write_failed);
    }
    pub fn incr_log_publish_failed(&self) {
        Self::incr(&self.log_publish_failed);
    }
    pub fn incr_direct_write_fallback(&self) {
        Self::incr(&self.direct_write_fallback);
    }
    pub fn incr_direct_write_failed(&self) {
        Self::incr(&self.direct_write_failed);
    }
    pub fn add_persisted(&self, n: u64) {
        self.persisted.fetch_add(n, Ordering::Relaxed);
    }
    pub fn incr_persist_parse_failed(&self) {
        Self::incr(&self.persist_parse_failed);
    }
    pub fn incr_persist_write_failed(&self) {
        Self::incr(&self.persist_write_failed);
    }
    pub fn incr_fanout_batches(&self) {
        Self::incr(&self.fanout_batches);
    }
    pub fn add_fanout_pushed(&self, n: u64) {
        self.fanout_pushed.fetch_add(n, Ordering::Relaxed);
    }
    pub fn incr_alerts_relayed(&self) {
        Self::incr(&self.alerts_relayed);
    }
    pub fn incr_sos_credit_exhausted(&self) {
        Self::incr(&self.sos_credit_exhausted);
    }
    pub fn incr_socket_sessions_opened(&self) {
        Self::incr(&self.socket_sessions_opened);
    }
    pub fn incr_socket_sessions_closed(&self) {
        Self::incr(&self.socket_sessions_closed);
    }
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ingested: self.ingested.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            no_motion: self.no_motion.load(Ordering::Relaxed),
            accepted_forward: self.accepted_forward.load(Ordering::Relaxed),
            cache_write_failed: self.cache_write_failed.load(Ordering::Relaxed),
            log_publish_failed: self.log_publish_failed.load(Ordering::Relaxed),
            direct_write_fallback: self.direct_write_fallback.load(Ordering::Relaxed),
            direct_write_failed: self.direct_write_failed.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_parse_failed: self.persist_parse_failed.load(Ordering::Relaxed),
            persist_write_failed: self.persist_write_failed.load(Ordering::Relaxed),
            fanout_batches: self.fanout_batches.load(Ordering::Relaxed),
            fanout_pushed: self.fanout_pushed.load(Ordering::Relaxed),
            alerts_relayed: self.alerts_relayed.load(Ordering::Relaxed),
            sos_credit_exhausted: self.sos_credit_exhausted.load(Ordering::Relaxed),
            socket_sessions_opened: self.socket_sessions_opened.load(Ordering::Relaxed),
            socket_sessions_closed: self.socket_sessions_closed.load(Ordering::Relaxed),
            socket_messages_dropped: self.socket_messages_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub ingested: u64,
    pub throttled: u64,
    pub no_motion: u64,
    pub accepted_forward: u64,
    pub cache_write_failed: u64,
    pub log_publish_failed: u64,
    pub direct_write_fallback: u64,
    pub direct_write_failed: u64,
    pub persisted: u64,
    pub persist_parse_failed: u64,
    pub persist_write_failed: u64,
    pub fanout_batches: u64,
    pub fanout_pushed: u64,
    pub alerts_relayed: u64,
    pub sos_credit_exhausted: u64,
    pub socket_sessions_opened: u64,
    pub socket_sessions_closed: u64,
    pub socket_messages_dropped: u64,
}
