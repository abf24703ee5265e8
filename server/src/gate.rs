use std::sync::Arc;
use std::time::Duration;

use crate::cache::HotCache;
use crate::config::Config;

/// Outcome of the throttle/dead-zone gate (§4.B). `G` (ingress) branches on
/// this before touching the cache or the log any further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed with the full write path.
    AcceptedForward,
    /// Accepted but suppressed: no cache write, no log publish (§4.B step 2,
    /// Glossary "Dead zone").
    AcceptedNoMotion,
    /// Rejected; `retry_after_ms` is always 1000 per §4.B step 1.
    Throttled { retry_after_ms: u64 },
}

/// Run the two-step gate over the hot cache (§4.B). The throttle counter is
/// always checked first so a device cannot dodge rate-limiting by reporting
/// no motion (§4.B "Tie-breaks").
///
/// Cache failures degrade per §4.A's stated policy: a throttle-counter
/// failure is fail-open (permit), a movement-check failure is fail-true
/// (treat as moved). Both are logged, not surfaced as errors — the gate
/// itself never fails the request.
pub async fn run(cache: &Arc<dyn HotCache>, config: &Config, vehicle_id: &str, lat: f64, lng: f64) -> GateDecision {
    let count = match cache
        .incr_throttle(vehicle_id, config.throttle_window)
        .await
    {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, vehicle_id, "throttle_check_failed_fail_open");
            0
        }
    };
    if count > config.throttle_max as u64 {
        return GateDecision::Throttled {
            retry_after_ms: retry_after_ms(config.throttle_window),
        };
    }

    let moved = match cache
        .has_moved(vehicle_id, lat, lng, config.dead_zone_min_m)
        .await
    {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, vehicle_id, "movement_check_failed_fail_true");
            true
        }
    };
    if !moved {
        return GateDecision::AcceptedNoMotion;
    }

    GateDecision::AcceptedForward
}

fn retry_after_ms(window: Duration) -> u64 {
    window.as_millis() as u64
}

/// Advisory interval handed back to the device after a successful no-op
/// ping (§4.B step 2 "`next_ping_ms = 5000`").
pub const NEXT_PING_MS: u64 = 5000;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    fn config() -> Config {
        Config {
            port: 8080,
            mongo_uri: "mongodb://localhost".into(),
            redis_url: None,
            kafka_brokers: None,
            jwt_secret: None,
            client_url: None,
            node_env: "test".into(),
            cache_ttl: Duration::from_secs(300),
            throttle_window: Duration::from_secs(1),
            throttle_max: 5,
            dead_zone_min_m: 10.0,
            history_retention: Duration::from_secs(30 * 24 * 3600),
            batch_max_bytes: 1024 * 1024,
            ingest_deadline: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn sixth_ping_in_one_second_is_throttled() {
        let cache: Arc<dyn HotCache> = Arc::new(InMemoryCache::new(Duration::from_secs(300)));
        let cfg = config();
        for i in 0..5 {
            let lat = 12.97 + (i as f64) * 0.001;
            let decision = run(&cache, &cfg, "veh_x", lat, 77.59).await;
            assert_eq!(decision, GateDecision::AcceptedForward, "attempt {i}");
        }
        let sixth = run(&cache, &cfg, "veh_x", 12.975, 77.59).await;
        assert_eq!(
            sixth,
            GateDecision::Throttled {
                retry_after_ms: 1000
            }
        );
    }

    #[tokio::test]
    async fn stationary_ping_is_suppressed_after_first() {
        let cache: Arc<dyn HotCache> = Arc::new(InMemoryCache::new(Duration::from_secs(300)));
        let cfg = config();
        let first = run(&cache, &cfg, "veh_y", 12.97, 77.59).await;
        assert_eq!(first, GateDecision::AcceptedForward);
        let second = run(&cache, &cfg, "veh_y", 12.97, 77.59).await;
        assert_eq!(second, GateDecision::AcceptedNoMotion);
    }

    #[tokio::test]
    async fn throttle_is_checked_before_motion_so_it_cannot_be_bypassed() {
        // Six identical (no-motion) pings in one second — the sixth must
        // still be throttled, not silently accepted-no-motion (§4.B
        // "Tie-breaks").
        let cache: Arc<dyn HotCache> = Arc::new(InMemoryCache::new(Duration::from_secs(300)));
        let cfg = config();
        let _ = run(&cache, &cfg, "veh_z", 12.97, 77.59).await;
        for _ in 0..4 {
            let d = run(&cache, &cfg, "veh_z", 12.97, 77.59).await;
            assert_eq!(d, GateDecision::AcceptedNoMotion);
        }
        let sixth = run(&cache, &cfg, "veh_z", 12.97, 77.59).await;
        assert!(matches!(sixth, GateDecision::Throttled { .. }));
    }
}
