use chrono::{DateTime, Duration, Utc};

/// Rows requested per poll.
pub const REQUEST_LIMIT: usize = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePreset {
    pub name: &'static str,
    pub minutes: i64,
}

pub const PRESETS: [RangePreset; 7] = [
    RangePreset { name: "15m", minutes: 15 },
    RangePreset { name: "30m", minutes: 30 },
    RangePreset { name: "1h", minutes: 60 },
    RangePreset { name: "6h", minutes: 6 * 60 },
    RangePreset { name: "24h", minutes: 24 * 60 },
    RangePreset { name: "7d", minutes: 7 * 24 * 60 },
    RangePreset { name: "30d", minutes: 30 * 24 * 60 },
];

pub const DEFAULT_RANGE: &str = "6h";

impl RangePreset {
    /// Looks up a preset by name, falling back to one hour.
    pub fn find(name: &str) -> Self {
        PRESETS
            .iter()
            .copied()
            .find(|p| p.name == name)
            .unwrap_or(PRESETS[2])
    }

    pub fn is_known(name: &str) -> bool {
        PRESETS.iter().any(|p| p.name == name)
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes)
    }

    /// `(from, to)` ending at `now`.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.duration(), now)
    }

    /// Whether axis labels should carry the date.
    pub fn spans_days(&self) -> bool {
        self.minutes >= 48 * 60
    }
}

/// Bucket size requested for a display range. Only `m` and `h` units are
/// understood by the server; anything else would silently return raw rows.
pub fn bucket_for_range(range: &str) -> &'static str {
    match range {
        "15m" | "30m" => "1m",
        "1h" => "2m",
        "6h" => "10m",
        "24h" => "30m",
        "7d" => "3h",
        "30d" => "6h",
        _ => "10m",
    }
}
