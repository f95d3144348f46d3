use crate::bucket::Bucket;
use crate::model::{BucketReading, FieldStats, Reading};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: u32,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new(value: f64) -> Self {
        Self {
            sum: value,
            count: 1,
            min: value,
            max: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn finish(&self) -> FieldStats {
        // Summation error must not push the mean outside [min, max]
        let avg = (self.sum / f64::from(self.count)).clamp(self.min, self.max);
        FieldStats {
            avg,
            min: self.min,
            max: self.max,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BucketAccumulator {
    temperature: Accumulator,
    humidity: Accumulator,
    aqi: Accumulator,
}

impl BucketAccumulator {
    fn new(reading: &Reading) -> Self {
        Self {
            temperature: Accumulator::new(reading.temperature),
            humidity: Accumulator::new(reading.humidity),
            aqi: Accumulator::new(reading.aqi),
        }
    }

    fn push(&mut self, reading: &Reading) {
        self.temperature.push(reading.temperature);
        self.humidity.push(reading.humidity);
        self.aqi.push(reading.aqi);
    }
}

/// Groups readings by truncated timestamp and computes per-bucket statistics.
///
/// Output is ordered by bucket start and holds at most `limit` buckets.
pub fn aggregate<'a, I>(readings: I, bucket: Bucket, tz: Tz, limit: usize) -> Vec<BucketReading>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let mut buckets: BTreeMap<DateTime<Utc>, BucketAccumulator> = BTreeMap::new();

    for reading in readings {
        let key = bucket.truncate(reading.timestamp, tz);
        buckets
            .entry(key)
            .and_modify(|acc| acc.push(reading))
            .or_insert_with(|| BucketAccumulator::new(reading));
    }

    buckets
        .into_iter()
        .take(limit)
        .map(|(ts, acc)| {
            BucketReading::new(
                ts,
                acc.temperature.finish(),
                acc.humidity.finish(),
                acc.aqi.finish(),
            )
        })
        .collect()
}
