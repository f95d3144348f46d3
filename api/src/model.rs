use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A validated reading that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub aqi: f64,
}

/// A persisted sensor sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub id: Uuid,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub aqi: f64,
}

impl Reading {
    pub fn from_new(id: Uuid, reading: NewReading) -> Self {
        Self {
            id,
            device_id: reading.device_id,
            timestamp: reading.timestamp,
            temperature: reading.temperature,
            humidity: reading.humidity,
            aqi: reading.aqi,
        }
    }
}

/// Device, time window and row cap shared by raw and aggregated queries.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub device_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: usize,
}

impl RangeQuery {
    pub fn contains(&self, reading: &Reading) -> bool {
        reading.device_id == self.device_id
            && reading.timestamp >= self.from
            && reading.timestamp <= self.to
    }
}

/// One row of a raw-mode response.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RawReading {
    pub ts: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub aqi: f64,
}

impl From<&Reading> for RawReading {
    fn from(r: &Reading) -> Self {
        Self {
            ts: r.timestamp,
            temperature: r.temperature,
            humidity: r.humidity,
            aqi: r.aqi,
        }
    }
}

/// Statistics of one measurement inside a bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl FieldStats {
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// One row of an aggregated-mode response.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BucketReading {
    pub ts: DateTime<Utc>,

    pub temperature_avg: f64,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub temperature_range: f64,

    pub humidity_avg: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
    pub humidity_range: f64,

    pub aqi_avg: f64,
    pub aqi_min: f64,
    pub aqi_max: f64,
    pub aqi_range: f64,
}

impl BucketReading {
    pub fn new(
        ts: DateTime<Utc>,
        temperature: FieldStats,
        humidity: FieldStats,
        aqi: FieldStats,
    ) -> Self {
        Self {
            ts,
            temperature_avg: temperature.avg,
            temperature_min: temperature.min,
            temperature_max: temperature.max,
            temperature_range: temperature.range(),
            humidity_avg: humidity.avg,
            humidity_min: humidity.min,
            humidity_max: humidity.max,
            humidity_range: humidity.range(),
            aqi_avg: aqi.avg,
            aqi_min: aqi.min,
            aqi_max: aqi.max,
            aqi_range: aqi.range(),
        }
    }

    pub fn temperature(&self) -> FieldStats {
        FieldStats {
            avg: self.temperature_avg,
            min: self.temperature_min,
            max: self.temperature_max,
        }
    }

    pub fn humidity(&self) -> FieldStats {
        FieldStats {
            avg: self.humidity_avg,
            min: self.humidity_min,
            max: self.humidity_max,
        }
    }

    pub fn aqi(&self) -> FieldStats {
        FieldStats {
            avg: self.aqi_avg,
            min: self.aqi_min,
            max: self.aqi_max,
        }
    }
}

/// Most recent reading of a device.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LatestReading {
    pub device_id: String,
    pub ts: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub aqi: f64,
}

impl From<&Reading> for LatestReading {
    fn from(r: &Reading) -> Self {
        Self {
            device_id: r.device_id.clone(),
            ts: r.timestamp,
            temperature: r.temperature,
            humidity: r.humidity,
            aqi: r.aqi,
        }
    }
}

/// Body of `GET /api/readings`, tagged by `mode`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReadingsPage {
    Raw {
        #[serde(rename = "deviceId")]
        device_id: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        count: usize,
        readings: Vec<RawReading>,
    },
    Aggregated {
        bucket: String,
        #[serde(rename = "deviceId")]
        device_id: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        count: usize,
        readings: Vec<BucketReading>,
    },
}

#[derive(Debug, Serialize)]
pub struct ReadingsResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub page: ReadingsPage,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub ok: bool,
    pub devices: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub ok: bool,
    pub latest: Vec<LatestReading>,
}
