use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Largest number of points handed to the charts.
pub const MAX_CHART_POINTS: usize = 900;

/// One raw-mode row of `GET /api/readings`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRow {
    pub ts: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub aqi: f64,
}

/// One aggregated-mode row of `GET /api/readings`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRow {
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

/// The two response shapes, told apart by the envelope's `mode` flag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ReadingsPage {
    Raw {
        #[serde(default)]
        readings: Vec<RawRow>,
    },
    Aggregated {
        #[serde(default)]
        bucket: Option<String>,
        #[serde(default)]
        readings: Vec<BucketRow>,
    },
}

impl ReadingsPage {
    /// Decodes a readings envelope.
    ///
    /// Envelopes from servers that do not send `mode` are classified by
    /// probing the last row for `temperatureAvg`.
    pub fn decode(envelope: Value) -> serde_json::Result<Self> {
        if envelope.get("mode").is_some() {
            return serde_json::from_value(envelope);
        }

        let rows = envelope
            .get("readings")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let aggregated = rows
            .as_array()
            .and_then(|rows| rows.last())
            .is_some_and(|row| row.get("temperatureAvg").is_some());

        if aggregated {
            Ok(ReadingsPage::Aggregated {
                bucket: None,
                readings: serde_json::from_value(rows)?,
            })
        } else {
            Ok(ReadingsPage::Raw {
                readings: serde_json::from_value(rows)?,
            })
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ReadingsPage::Raw { readings } => readings.len(),
            ReadingsPage::Aggregated { readings, .. } => readings.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_aggregated(&self) -> bool {
        matches!(self, ReadingsPage::Aggregated { .. })
    }

    /// Chart points in one shape regardless of mode.
    pub fn normalize(&self) -> Vec<ChartPoint> {
        match self {
            ReadingsPage::Raw { readings } => readings.iter().map(ChartPoint::from).collect(),
            ReadingsPage::Aggregated { readings, .. } => {
                readings.iter().map(ChartPoint::from).collect()
            }
        }
    }
}

/// Average with its spread. Raw samples have `avg == min == max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
}

impl Band {
    pub fn single(value: f64) -> Self {
        Self {
            avg: value,
            min: value,
            max: value,
            range: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Temperature,
    Humidity,
    Aqi,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Temperature, Metric::Humidity, Metric::Aqi];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::Humidity => "Humidity",
            Metric::Aqi => "AQI",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Temperature => " °C",
            Metric::Humidity => " %",
            Metric::Aqi => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub ts: DateTime<Utc>,
    pub temperature: Band,
    pub humidity: Band,
    pub aqi: Band,
}

impl ChartPoint {
    pub fn band(&self, metric: Metric) -> Band {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Aqi => self.aqi,
        }
    }
}

impl From<&RawRow> for ChartPoint {
    fn from(row: &RawRow) -> Self {
        Self {
            ts: row.ts,
            temperature: Band::single(row.temperature),
            humidity: Band::single(row.humidity),
            aqi: Band::single(row.aqi),
        }
    }
}

impl From<&BucketRow> for ChartPoint {
    fn from(row: &BucketRow) -> Self {
        Self {
            ts: row.ts,
            temperature: Band {
                avg: row.temperature_avg,
                min: row.temperature_min,
                max: row.temperature_max,
                range: row.temperature_range,
            },
            humidity: Band {
                avg: row.humidity_avg,
                min: row.humidity_min,
                max: row.humidity_max,
                range: row.humidity_range,
            },
            aqi: Band {
                avg: row.aqi_avg,
                min: row.aqi_min,
                max: row.aqi_max,
                range: row.aqi_range,
            },
        }
    }
}

/// Keeps every `ceil(len / max_points)`-th point, starting with the first.
pub fn downsample<T: Clone>(points: &[T], max_points: usize) -> Vec<T> {
    if points.len() <= max_points || max_points == 0 {
        return points.to_vec();
    }
    let step = points.len().div_ceil(max_points);
    points.iter().step_by(step).cloned().collect()
}

/// Lowest minimum and highest maximum of a metric across the displayed points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
}

pub fn extent(points: &[ChartPoint], metric: Metric) -> Option<Extent> {
    points.iter().map(|p| p.band(metric)).fold(None, |acc, band| {
        Some(match acc {
            None => Extent {
                min: band.min,
                max: band.max,
            },
            Some(e) => Extent {
                min: e.min.min(band.min),
                max: e.max.max(band.max),
            },
        })
    })
}
