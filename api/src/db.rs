use crate::bucket::Bucket;
use crate::errors::Result;
use crate::model::{BucketReading, LatestReading, NewReading, RangeQuery, RawReading};
use crate::store::ReadingStore;
use async_trait::async_trait;
use chrono_tz::Tz;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Postgres-backed store. Bucketing runs inside the database.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn limit(query: &RangeQuery) -> i64 {
    i64::try_from(query.limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn insert(&self, reading: NewReading) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO readings (id, device_id, ts, temperature, humidity, aqi)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(&reading.device_id)
        .bind(reading.timestamp)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.aqi)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn devices(&self) -> Result<Vec<String>> {
        let devices = sqlx::query_scalar::<_, String>(
            r#"SELECT DISTINCT device_id COLLATE "C" AS device_id FROM readings ORDER BY 1"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(devices)
    }

    async fn latest(&self) -> Result<Vec<LatestReading>> {
        let latest = sqlx::query_as::<_, LatestReading>(
            r#"
            SELECT device_id, ts, temperature, humidity, aqi FROM (
                SELECT DISTINCT ON (device_id) device_id, ts, temperature, humidity, aqi
                FROM readings
                ORDER BY device_id, ts DESC
            ) latest
            ORDER BY device_id COLLATE "C"
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(latest)
    }

    async fn raw(&self, query: &RangeQuery) -> Result<Vec<RawReading>> {
        let rows = sqlx::query_as::<_, RawReading>(
            "SELECT ts, temperature, humidity, aqi
             FROM readings
             WHERE device_id = $1 AND ts >= $2 AND ts <= $3
             ORDER BY ts ASC, id ASC
             LIMIT $4",
        )
        .bind(&query.device_id)
        .bind(query.from)
        .bind(query.to)
        .bind(limit(query))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn aggregated(
        &self,
        query: &RangeQuery,
        bucket: Bucket,
        tz: Tz,
    ) -> Result<Vec<BucketReading>> {
        // Bins are laid out on local wall-clock time from 2000-01-01 and the
        // bin start keeps the reading's own offset, as in Bucket::truncate
        let rows = sqlx::query_as::<_, BucketReading>(
            r#"
            SELECT
                ts - ((ts AT TIME ZONE $5)
                    - date_bin(make_interval(mins => $4), ts AT TIME ZONE $5, TIMESTAMP '2000-01-01'))
                    AS ts,
                GREATEST(LEAST(avg(temperature), max(temperature)), min(temperature)) AS temperature_avg,
                min(temperature) AS temperature_min,
                max(temperature) AS temperature_max,
                max(temperature) - min(temperature) AS temperature_range,
                GREATEST(LEAST(avg(humidity), max(humidity)), min(humidity)) AS humidity_avg,
                min(humidity) AS humidity_min,
                max(humidity) AS humidity_max,
                max(humidity) - min(humidity) AS humidity_range,
                GREATEST(LEAST(avg(aqi), max(aqi)), min(aqi)) AS aqi_avg,
                min(aqi) AS aqi_min,
                max(aqi) AS aqi_max,
                max(aqi) - min(aqi) AS aqi_range
            FROM readings
            WHERE device_id = $1 AND ts >= $2 AND ts <= $3
            GROUP BY 1
            ORDER BY 1
            LIMIT $6
            "#,
        )
        .bind(&query.device_id)
        .bind(query.from)
        .bind(query.to)
        .bind(bucket.minutes())
        .bind(tz.name())
        .bind(limit(query))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
