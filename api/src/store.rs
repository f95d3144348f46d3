use crate::aggregate::aggregate;
use crate::bucket::Bucket;
use crate::errors::Result;
use crate::model::{BucketReading, LatestReading, NewReading, RangeQuery, RawReading, Reading};
use async_trait::async_trait;
use chrono_tz::Tz;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only reading storage shared by all request handlers.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Persists one reading and returns its generated id.
    async fn insert(&self, reading: NewReading) -> Result<Uuid>;

    /// Distinct device ids, sorted by byte order.
    async fn devices(&self) -> Result<Vec<String>>;

    /// Most recent reading of every device, sorted by device id.
    async fn latest(&self) -> Result<Vec<LatestReading>>;

    /// Readings inside the window, ascending by timestamp.
    async fn raw(&self, query: &RangeQuery) -> Result<Vec<RawReading>>;

    /// Per-bucket statistics inside the window, ascending by bucket start.
    async fn aggregated(
        &self,
        query: &RangeQuery,
        bucket: Bucket,
        tz: Tz,
    ) -> Result<Vec<BucketReading>>;
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: RwLock<Vec<Reading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert(&self, reading: NewReading) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.readings
            .write()
            .await
            .push(Reading::from_new(id, reading));
        Ok(id)
    }

    async fn devices(&self) -> Result<Vec<String>> {
        let readings = self.readings.read().await;
        let mut devices: Vec<String> = readings.iter().map(|r| r.device_id.clone()).collect();
        devices.sort();
        devices.dedup();
        Ok(devices)
    }

    async fn latest(&self) -> Result<Vec<LatestReading>> {
        let readings = self.readings.read().await;
        let mut latest: BTreeMap<&str, &Reading> = BTreeMap::new();
        for reading in readings.iter() {
            latest
                .entry(reading.device_id.as_str())
                .and_modify(|current| {
                    if reading.timestamp >= current.timestamp {
                        *current = reading;
                    }
                })
                .or_insert(reading);
        }
        Ok(latest.into_values().map(LatestReading::from).collect())
    }

    async fn raw(&self, query: &RangeQuery) -> Result<Vec<RawReading>> {
        let readings = self.readings.read().await;
        let mut matching: Vec<&Reading> = readings.iter().filter(|r| query.contains(r)).collect();
        // Stable sort keeps insertion order for equal timestamps
        matching.sort_by_key(|r| r.timestamp);
        Ok(matching
            .into_iter()
            .take(query.limit)
            .map(RawReading::from)
            .collect())
    }

    async fn aggregated(
        &self,
        query: &RangeQuery,
        bucket: Bucket,
        tz: Tz,
    ) -> Result<Vec<BucketReading>> {
        let readings = self.readings.read().await;
        Ok(aggregate(
            readings.iter().filter(|r| query.contains(r)),
            bucket,
            tz,
            query.limit,
        ))
    }
}
