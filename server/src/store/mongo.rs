use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};

use crate::domain::vehicle::VehicleStatus;
use crate::domain::{Position, VehicleDescriptor};

use super::{HistoryStore, VehicleStore};

/// System-of-record store backed by the official `mongodb` driver (§6
/// "Persisted-state layout"). Indexes mirror spec.md §6 exactly: positions
/// on `(vehicle_id, timestamp desc)`, vehicles on `(owner_id)`, unique
/// `(plate)`, and `(is_public, type, status)`.
pub struct MongoStore {
    positions: Collection<Document>,
    vehicles: Collection<Document>,
}

impl MongoStore {
    pub async fn connect(uri: &str) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.default_database().unwrap_or_else(|| client.database("fleettrack"));
        let positions = db.collection::<Document>("positions");
        let vehicles = db.collection::<Document>("vehicles");

        let store = Self { positions, vehicles };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> anyhow::Result<()> {
        self.positions
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "vehicleId": 1, "timestampMs": -1 })
                    .build(),
                None,
            )
            .await?;
        self.vehicles
            .create_index(IndexModel::builder().keys(doc! { "ownerId": 1 }).build(), None)
            .await?;
        self.vehicles
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "plate": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await?;
        self.vehicles
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "isPublic": 1, "type": 1, "status": 1 })
                    .build(),
                None,
            )
            .await?;
        Ok(())
    }

    fn to_doc(pos: &Position) -> Document {
        doc! {
            "vehicleId": &pos.vehicle_id,
            "lat": pos.lat,
            "lng": pos.lng,
            "speed": pos.speed,
            "heading": pos.heading,
            "accuracy": pos.accuracy,
            "altitude": pos.altitude,
            "timestampMs": pos.timestamp_ms as i64,
        }
    }

    fn from_doc(d: Document) -> Option<Position> {
        Some(Position {
            vehicle_id: d.get_str("vehicleId").ok()?.to_string(),
            lat: d.get_f64("lat").ok()?,
            lng: d.get_f64("lng").ok()?,
            speed: d.get_f64("speed").unwrap_or(0.0),
            heading: d.get_f64("heading").unwrap_or(0.0),
            accuracy: d.get_f64("accuracy").unwrap_or(0.0),
            altitude: d.get_f64("altitude").unwrap_or(0.0),
            timestamp_ms: d.get_i64("timestampMs").ok()? as u64,
        })
    }
}

#[async_trait]
impl HistoryStore for MongoStore {
    async fn insert_many(&self, positions: &[Position]) -> anyhow::Result<()> {
        if positions.is_empty() {
            return Ok(());
        }
        let docs: Vec<Document> = positions.iter().map(Self::to_doc).collect();
        // Unordered: a duplicate-key error on one document doesn't abort the
        // rest of the batch (§4.D step 3 / §7 "ignored" unique-key
        // conflicts within a batch).
        let opts = mongodb::options::InsertManyOptions::builder()
            .ordered(false)
            .build();
        match self.positions.insert_many(docs, opts).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key_only(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_one(&self, position: &Position) -> anyhow::Result<()> {
        self.positions.insert_one(Self::to_doc(position), None).await?;
        Ok(())
    }

    async fn query_current(&self, vehicle_id: &str) -> anyhow::Result<Option<Position>> {
        let opts = FindOptions::builder()
            .sort(doc! { "timestampMs": -1 })
            .limit(1)
            .build();
        let mut cursor = self
            .positions
            .find(doc! { "vehicleId": vehicle_id }, opts)
            .await?;
        Ok(match cursor.try_next().await? {
            Some(d) => Self::from_doc(d),
            None => None,
        })
    }

    async fn query_history(
        &self,
        vehicle_id: &str,
        from_ms: Option<u64>,
        to_ms: Option<u64>,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<Vec<Position>> {
        let limit = limit.min(1000);
        let mut filter = doc! { "vehicleId": vehicle_id };
        if from_ms.is_some() || to_ms.is_some() {
            let mut range = Document::new();
            if let Some(from) = from_ms {
                range.insert("$gte", from as i64);
            }
            if let Some(to) = to_ms {
                range.insert("$lte", to as i64);
            }
            filter.insert("timestampMs", range);
        }
        let opts = FindOptions::builder()
            .sort(doc! { "timestampMs": -1 })
            .skip((page as u64) * (limit as u64))
            .limit(limit as i64)
            .build();
        let cursor = self.positions.find(filter, opts).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs.into_iter().filter_map(Self::from_doc).collect())
    }

    async fn query_since(&self, since_ms: u64) -> anyhow::Result<Vec<Position>> {
        let opts = FindOptions::builder().sort(doc! { "timestampMs": -1 }).build();
        let cursor = self
            .positions
            .find(doc! { "timestampMs": { "$gte": since_ms as i64 } }, opts)
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs.into_iter().filter_map(Self::from_doc).collect())
    }

    async fn gc_older_than(&self, cutoff_ms: u64) -> anyhow::Result<u64> {
        let result = self
            .positions
            .delete_many(doc! { "timestampMs": { "$lt": cutoff_ms as i64 } }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.positions.find_one(doc! {}, None).await?;
        Ok(())
    }
}

#[async_trait]
impl VehicleStore for MongoStore {
    async fn update_status_and_last_seen(
        &self,
        vehicle_ids: &[String],
        status: VehicleStatus,
        now_ms: u64,
    ) -> anyhow::Result<()> {
        if vehicle_ids.is_empty() {
            return Ok(());
        }
        self.vehicles
            .update_many(
                doc! { "vehicleId": { "$in": vehicle_ids } },
                doc! { "$set": { "status": status.as_str(), "lastSeenMs": now_ms as i64 } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn get_public_descriptors(
        &self,
        vehicle_ids: &[String],
    ) -> anyhow::Result<Vec<VehicleDescriptor>> {
        let cursor = self
            .vehicles
            .find(
                doc! { "vehicleId": { "$in": vehicle_ids }, "isPublic": true },
                None,
            )
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| {
                let status = match d.get_str("status").unwrap_or("offline") {
                    "active" => VehicleStatus::Active,
                    "idle" => VehicleStatus::Idle,
                    _ => VehicleStatus::Offline,
                };
                Some(VehicleDescriptor {
                    vehicle_id: d.get_str("vehicleId").ok()?.to_string(),
                    owner_id: d.get_str("ownerId").unwrap_or_default().to_string(),
                    is_public: d.get_bool("isPublic").unwrap_or(false),
                    status,
                    last_seen_ms: d.get_i64("lastSeenMs").unwrap_or(0) as u64,
                })
            })
            .collect())
    }
}

fn is_duplicate_key_only(e: &mongodb::error::Error) -> bool {
    matches!(
        *e.kind,
        mongodb::error::ErrorKind::BulkWrite(ref bw)
            if bw.write_errors.as_ref().map_or(false, |errs| errs.iter().all(|we| we.code == 11000))
    )
}
