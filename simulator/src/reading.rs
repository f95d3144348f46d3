use rand::Rng;
use serde::Serialize;

/// Body of `POST /ingest`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub aqi: f64,
}

/// Slowly drifting sensor state for one simulated device.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    temperature: f64,
    humidity: f64,
    aqi: f64,
}

impl Device {
    pub fn new(id: String, rng: &mut impl Rng) -> Self {
        Self {
            id,
            temperature: rng.gen_range(18.0..26.0),
            humidity: rng.gen_range(35.0..60.0),
            aqi: rng.gen_range(5.0..40.0),
        }
    }

    /// Advances the random walk and returns the next reading.
    pub fn sample(&mut self, rng: &mut impl Rng) -> Reading {
        self.temperature = (self.temperature + rng.gen_range(-0.3..0.3)).clamp(-20.0, 45.0);
        self.humidity = (self.humidity + rng.gen_range(-1.0..1.0)).clamp(0.0, 100.0);
        self.aqi = if rng.gen_bool(0.02) {
            rng.gen_range(150.0..300.0) // 2% pollution spikes
        } else {
            (self.aqi + rng.gen_range(-2.0..2.0)).clamp(0.0, 150.0)
        };

        Reading {
            device_id: self.id.clone(),
            temperature: round1(self.temperature),
            humidity: round1(self.humidity),
            aqi: self.aqi.round(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
