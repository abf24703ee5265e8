use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::TopicPartitionList;

use super::{ConsumedRecord, EventLogBus, LogConsumer, Topic};

/// Bounded retry budget for a single publish (§5 "Cancellation and
/// timeouts" — "Log publishes have a bounded retry budget (≤ 8 attempts
/// with capped exponential backoff)"). A plain loop, not a crate: a single
/// call site doesn't earn a backoff dependency.
const MAX_PUBLISH_ATTEMPTS: u32 = 8;
const BACKOFF_BASE: Duration = Duration::from_millis(50);
const BACKOFF_CAP: Duration = Duration::from_secs(2);

/// Event log bus backed by `rdkafka`'s `FutureProducer`/`StreamConsumer`
/// pair. Records are JSON-encoded rather than the teacher's protobuf —
/// protobuf in the teacher repo was specific to its signed-device-packet
/// domain and carries no benefit for this data model (see DESIGN.md).
pub struct KafkaEventLog {
    producer: FutureProducer,
    brokers: String,
}

impl KafkaEventLog {
    pub fn connect(brokers: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            // partition-leader ack (§4.C "Acknowledgement level"): acks=1
            // balances durability against latency rather than waiting for
            // the full ISR (acks=all).
            .set("acks", "1")
            .create()?;
        Ok(Self {
            producer,
            brokers: brokers.to_string(),
        })
    }

    async fn send_one(&self, topic: Topic, key: &str, payload: &[u8]) -> Result<(), KafkaError> {
        let record = FutureRecord::to(topic.as_str()).key(key).payload(payload);
        match self.producer.send(record, Duration::from_secs(5)).await {
            Ok(_) => Ok(()),
            Err((e, _)) => Err(e),
        }
    }
}

#[async_trait]
impl EventLogBus for KafkaEventLog {
    async fn publish(&self, topic: Topic, key: &str, payload: &[u8]) -> bool {
        let mut backoff = BACKOFF_BASE;
        for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
            match self.send_one(topic, key, payload).await {
                Ok(()) => return true,
                Err(e) if attempt == MAX_PUBLISH_ATTEMPTS => {
                    tracing::warn!(error = %e, topic = topic.as_str(), attempt, "log_publish_exhausted");
                    return false;
                }
                Err(e) => {
                    tracing::debug!(error = %e, topic = topic.as_str(), attempt, "log_publish_retry");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
            }
        }
        false
    }

    async fn publish_batch(&self, topic: Topic, records: &[(String, Vec<u8>)]) -> bool {
        // Atomic per call (§4.C): every record in this batch must land or
        // the whole call reports failure so the caller falls through to
        // the direct-write path for the entire batch, not a partial slice.
        let sends = records
            .iter()
            .map(|(key, payload)| self.send_one(topic, key, payload));
        let results = futures::future::join_all(sends).await;
        results.into_iter().all(|r| r.is_ok())
    }

    fn consumer(&self, group: &str, topic: Topic) -> Box<dyn LogConsumer> {
        Box::new(KafkaConsumer::new(&self.brokers, group, topic))
    }
}

struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: Topic,
}

impl KafkaConsumer {
    fn new(brokers: &str, group: &str, topic: Topic) -> Self {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .expect("kafka consumer config");
        consumer
            .subscribe(&[topic.as_str()])
            .expect("kafka subscribe");
        Self { consumer, topic }
    }
}

#[async_trait]
impl LogConsumer for KafkaConsumer {
    async fn fetch_batch(&mut self, max_bytes: usize) -> anyhow::Result<Vec<ConsumedRecord>> {
        let mut batch = Vec::new();
        let mut bytes = 0usize;
        // First record blocks (nothing to drain yet); subsequent records in
        // the same batch are opportunistic, bounded by the byte budget
        // (§4.D step 1).
        loop {
            let recv = if batch.is_empty() {
                self.consumer.recv().await
            } else {
                match tokio::time::timeout(Duration::from_millis(50), self.consumer.recv()).await
                {
                    Ok(r) => r,
                    Err(_) => break,
                }
            };
            let msg = match recv {
                Ok(m) => m,
                Err(e) => {
                    if batch.is_empty() {
                        return Err(anyhow::anyhow!("kafka recv error: {e}"));
                    }
                    break;
                }
            };
            let key = msg
                .key()
                .map(|k| String::from_utf8_lossy(k).to_string())
                .unwrap_or_default();
            let payload = msg.payload().unwrap_or_default().to_vec();
            bytes += payload.len();
            batch.push(ConsumedRecord {
                partition: msg.partition(),
                offset: msg.offset(),
                key,
                payload,
            });
            if bytes >= max_bytes {
                break;
            }
        }
        Ok(batch)
    }

    async fn commit(&mut self, records: &[ConsumedRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tpl = TopicPartitionList::new();
        // Commit the highest offset seen per partition (+1, Kafka convention
        // for "next offset to read").
        use std::collections::HashMap;
        let mut highest: HashMap<i32, i64> = HashMap::new();
        for r in records {
            let entry = highest.entry(r.partition).or_insert(r.offset);
            if r.offset > *entry {
                *entry = r.offset;
            }
        }
        for (partition, offset) in highest {
            tpl.add_partition_offset(
                self.topic.as_str(),
                partition,
                rdkafka::Offset::Offset(offset + 1),
            )?;
        }
        self.consumer
            .commit(&tpl, rdkafka::consumer::CommitMode::Async)?;
        Ok(())
    }
}
