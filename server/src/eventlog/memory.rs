use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ConsumedRecord, EventLogBus, LogConsumer, Topic};

/// In-process fake used by tests that exercise D/E/alert-processor without a
/// live broker, and — in `unavailable()` mode — as the substitute `main.rs`
/// wires up when `KAFKA_BROKERS` is unset or unreachable. A single partition
/// per topic (ordering within a topic is trivially total), which is a
/// stricter guarantee than production but never a weaker one — so behavior
/// observed against this fake also holds against Kafka.
///
/// Topic logs live behind an `Arc` shared with every consumer handed out by
/// `consumer()`, so a worker spawned at boot (before anything has been
/// published) still observes records published afterwards — a one-time
/// `Vec` snapshot would silently starve the persistence/fan-out workers in
/// the deployment this fake's `new()` mode exists for.
#[derive(Default)]
pub struct InMemoryEventLog {
    topics: Mutex<HashMap<&'static str, Arc<Mutex<Vec<(String, Vec<u8>)>>>>>,
    /// When `true`, `publish`/`publish_batch` always report failure without
    /// recording anything (§4.C "If the log is unreachable, publish returns
    /// false"). `main.rs` selects this mode whenever `KAFKA_BROKERS` is
    /// unset or unreachable, so every accepted ping takes the §4.D-direct
    /// fallback instead of being queued for the (non-existent) consumer
    /// workers to drain.
    unavailable: bool,
}

impl InMemoryEventLog {
    /// Working fake: publishes succeed and are visible to every consumer.
    /// Used by tests that need D/E/alert-processor to actually observe
    /// published records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitute for a down/absent Kafka: every publish reports failure, so
    /// callers fall through to the direct-write path (§4.D-direct) exactly
    /// as they would against a genuinely unreachable log.
    pub fn unavailable() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            unavailable: true,
        }
    }

    fn topic_log(&self, topic: Topic) -> Arc<Mutex<Vec<(String, Vec<u8>)>>> {
        self.topics
            .lock()
            .unwrap()
            .entry(topic.as_str())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

#[async_trait]
impl EventLogBus for InMemoryEventLog {
    async fn publish(&self, topic: Topic, key: &str, payload: &[u8]) -> bool {
        if self.unavailable {
            return false;
        }
        self.topic_log(topic)
            .lock()
            .unwrap()
            .push((key.to_string(), payload.to_vec()));
        true
    }

    async fn publish_batch(&self, topic: Topic, records: &[(String, Vec<u8>)]) -> bool {
        if self.unavailable {
            return false;
        }
        self.topic_log(topic).lock().unwrap().extend(records.iter().cloned());
        true
    }

    fn consumer(&self, _group: &str, topic: Topic) -> Box<dyn LogConsumer> {
        // Every consumer group sees the full log independently (§4.C); each
        // call gets its own cursor over the same shared, growing log rather
        // than a frozen copy or a shared cursor.
        Box::new(MemoryConsumer {
            log: self.topic_log(topic),
            next: 0,
        })
    }
}

struct MemoryConsumer {
    log: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    next: usize,
}

#[async_trait]
impl LogConsumer for MemoryConsumer {
    async fn fetch_batch(&mut self, max_bytes: usize) -> anyhow::Result<Vec<ConsumedRecord>> {
        let log = self.log.lock().unwrap();
        let mut batch = Vec::new();
        let mut bytes = 0usize;
        while self.next < log.len() {
            let (key, payload) = log[self.next].clone();
            bytes += payload.len();
            batch.push(ConsumedRecord {
                partition: 0,
                offset: self.next as i64,
                key,
                payload,
            });
            self.next += 1;
            if bytes >= max_bytes {
                break;
            }
        }
        Ok(batch)
    }

    async fn commit(&mut self, _records: &[ConsumedRecord]) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_consume_preserves_order() {
        let log = InMemoryEventLog::new();
        log.publish(Topic::VehicleLocations, "veh_1", b"a").await;
        log.publish(Topic::VehicleLocations, "veh_1", b"b").await;

        let mut consumer = log.consumer("g1", Topic::VehicleLocations);
        let batch = consumer.fetch_batch(1024 * 1024).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, b"a");
        assert_eq!(batch[1].payload, b"b");
    }

    #[tokio::test]
    async fn independent_groups_each_see_every_record() {
        let log = InMemoryEventLog::new();
        log.publish(Topic::VehicleLocations, "veh_1", b"a").await;

        let mut g1 = log.consumer("writer", Topic::VehicleLocations);
        let mut g2 = log.consumer("fanout", Topic::VehicleLocations);
        assert_eq!(g1.fetch_batch(1024).await.unwrap().len(), 1);
        assert_eq!(g2.fetch_batch(1024).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn consumer_created_before_any_publish_still_sees_later_records() {
        // Mirrors boot order in main.rs: workers open their consumer first,
        // then requests publish afterwards. A one-time snapshot taken at
        // `consumer()` time would starve this worker forever.
        let log = InMemoryEventLog::new();
        let mut consumer = log.consumer("location-db-writer", Topic::VehicleLocations);
        assert!(consumer.fetch_batch(1024).await.unwrap().is_empty());

        log.publish(Topic::VehicleLocations, "veh_1", b"a").await;
        log.publish(Topic::VehicleLocations, "veh_1", b"b").await;

        let batch = consumer.fetch_batch(1024).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, b"a");
        assert_eq!(batch[1].payload, b"b");
    }

    #[tokio::test]
    async fn unavailable_mode_fails_every_publish_and_records_nothing() {
        let log = InMemoryEventLog::unavailable();
        assert!(!log.publish(Topic::VehicleLocations, "veh_1", b"a").await);
        assert!(
            !log.publish_batch(Topic::VehicleLocations, &[("veh_1".into(), b"a".to_vec())])
                .await
        );

        let mut consumer = log.consumer("location-db-writer", Topic::VehicleLocations);
        assert!(consumer.fetch_batch(1024).await.unwrap().is_empty());
    }
}
