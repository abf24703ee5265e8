use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::Position;
use crate::geo::{meters_to_km, planar_distance_km};

use super::HotCache;

/// Remote hot cache backed by Redis. Keys follow `loc:{vehicle_id}` (§4.A);
/// throttle counters use a separate `thr:{vehicle_id}` key so TTL and value
/// semantics don't collide with the position entry.
pub struct RedisCache {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisCache {
    pub async fn connect(redis_url: &str, ttl: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    fn loc_key(vehicle_id: &str) -> String {
        format!("loc:{vehicle_id}")
    }

    fn thr_key(vehicle_id: &str) -> String {
        format!("thr:{vehicle_id}")
    }

    fn ts_key(vehicle_id: &str) -> String {
        format!("loc-ts:{vehicle_id}")
    }
}

/// Conditional set: only replaces the stored position/timestamp pair if the
/// incoming timestamp is not older than the one already stored (§3
/// invariant 1). The companion `loc-ts:` key is a plain integer rather than
/// re-parsing the JSON payload inside the script.
const CAS_PUT_SCRIPT: &str = r#"
    local cur_ts = redis.call("get", KEYS[2])
    if cur_ts and tonumber(cur_ts) > tonumber(ARGV[2]) then
        return 0
    end
    redis.call("set", KEYS[1], ARGV[1], "EX", ARGV[3])
    redis.call("set", KEYS[2], ARGV[2], "EX", ARGV[3])
    return 1
"#;

#[async_trait]
impl HotCache for RedisCache {
    async fn put(&self, vehicle_id: &str, pos: &Position) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(pos)?;
        let _: i32 = redis::cmd("EVAL")
            .arg(CAS_PUT_SCRIPT)
            .arg(2)
            .arg(Self::loc_key(vehicle_id))
            .arg(Self::ts_key(vehicle_id))
            .arg(payload)
            .arg(pos.timestamp_ms)
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, vehicle_id: &str) -> anyhow::Result<Option<Position>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::loc_key(vehicle_id)).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    async fn put_batch(&self, positions: &[Position]) -> anyhow::Result<()> {
        // Pipelined so a batch of any size still costs one round-trip (§4.A
        // "bounded number of round-trips irrespective of batch size"), each
        // item still going through the same CAS script as a single `put`.
        let mut pipe = redis::pipe();
        for pos in positions {
            let payload = serde_json::to_string(pos)?;
            pipe.cmd("EVAL")
                .arg(CAS_PUT_SCRIPT)
                .arg(2)
                .arg(Self::loc_key(&pos.vehicle_id))
                .arg(Self::ts_key(&pos.vehicle_id))
                .arg(payload)
                .arg(pos.timestamp_ms)
                .arg(self.ttl_secs)
                .ignore();
        }
        let mut conn = self.conn.clone();
        pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn incr_throttle(&self, vehicle_id: &str, window: Duration) -> anyhow::Result<u64> {
        let mut conn = self.conn.clone();
        let key = Self::thr_key(vehicle_id);
        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            // First write in the window establishes the TTL (§4.A
            // "first-write TTL equal to window_s").
            let _: () = conn.expire(&key, window.as_secs().max(1) as i64).await?;
        }
        Ok(count)
    }

    async fn has_moved(
        &self,
        vehicle_id: &str,
        lat: f64,
        lng: f64,
        min_m: f64,
    ) -> anyhow::Result<bool> {
        match self.get(vehicle_id).await? {
            None => Ok(true),
            Some(p) => Ok(planar_distance_km(p.lat, p.lng, lat, lng) >= meters_to_km(min_m)),
        }
    }
}
