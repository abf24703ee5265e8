use std::time::Duration;

/// Process configuration, read once at boot from the environment keys named
/// in §6. `MONGO_URI` is the only required key — there is no fallback for
/// the system of record, unlike the cache and event log.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub mongo_uri: String,
    pub redis_url: Option<String>,
    pub kafka_brokers: Option<String>,
    pub jwt_secret: Option<String>,
    pub client_url: Option<String>,
    pub node_env: String,

    // Tunables with defaults matching the constants named throughout §4.
    pub cache_ttl: Duration,
    pub throttle_window: Duration,
    pub throttle_max: u32,
    pub dead_zone_min_m: f64,
    pub history_retention: Duration,
    pub batch_max_bytes: usize,
    pub ingest_deadline: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mongo_uri =
            std::env::var("MONGO_URI").map_err(|_| ConfigError::Missing("MONGO_URI"))?;

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            mongo_uri,
            redis_url: std::env::var("REDIS_URL").ok(),
            kafka_brokers: std::env::var("KAFKA_BROKERS").ok(),
            jwt_secret: std::env::var("JWT_SECRET").ok(),
            client_url: std::env::var("CLIENT_URL").ok(),
            node_env: std::env::var("NODE_ENV").unwrap_or_else(|_| "development".into()),

            cache_ttl: Duration::from_secs(300), // T_cache
            throttle_window: Duration::from_secs(1),
            throttle_max: 5, // R_max
            dead_zone_min_m: 10.0, // D_min
            history_retention: Duration::from_secs(30 * 24 * 3600), // T_hist
            batch_max_bytes: env_usize("B_MAX_BYTES", 1024 * 1024),
            ingest_deadline: Duration::from_millis(env_u64("INGEST_DEADLINE_MS", 2000)),
        })
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
