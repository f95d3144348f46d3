use crate::model::{downsample, extent, ChartPoint, Metric, ReadingsPage, MAX_CHART_POINTS};
use crate::range::RangePreset;
use chrono::{DateTime, Local, Utc};
use std::fmt;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPARK_WIDTH: usize = 72;
const TABLE_ROWS: usize = 50;

/// What one successful poll produced.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub device_id: String,
    pub preset: RangePreset,
    pub page: ReadingsPage,
}

impl Snapshot {
    /// Every point of the response, oldest first.
    pub fn all_points(&self) -> Vec<ChartPoint> {
        self.page.normalize()
    }

    /// Points handed to the charts.
    pub fn chart_points(&self) -> Vec<ChartPoint> {
        downsample(&self.all_points(), MAX_CHART_POINTS)
    }
}

pub fn fmt1(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.1}", v),
        _ => "—".to_string(),
    }
}

fn format_ts(ts: DateTime<Utc>, with_date: bool) -> String {
    let local = ts.with_timezone(&Local);
    if with_date {
        local.format("%d/%m/%Y, %H:%M:%S").to_string()
    } else {
        local.format("%H:%M").to_string()
    }
}

/// Renders values as a one-line bar chart scaled to their own min and max.
pub fn sparkline(values: &[f64]) -> String {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = max - min;

    values
        .iter()
        .map(|v| {
            if span <= 0.0 || !span.is_finite() {
                SPARK_LEVELS[SPARK_LEVELS.len() / 2]
            } else {
                let level = ((v - min) / span * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
                SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
            }
        })
        .collect()
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let all = self.all_points();
        let charted = downsample(&all, MAX_CHART_POINTS);
        let mode = match &self.page {
            ReadingsPage::Raw { .. } => "raw".to_string(),
            ReadingsPage::Aggregated { bucket: Some(b), .. } => format!("aggregated, {}", b),
            ReadingsPage::Aggregated { bucket: None, .. } => "aggregated".to_string(),
        };

        writeln!(
            f,
            "Device {} | range {} | {} points ({})",
            self.device_id,
            self.preset.name,
            all.len(),
            mode
        )?;

        let Some(latest) = all.last() else {
            return writeln!(f, "No data in this range.");
        };

        writeln!(f)?;
        for metric in Metric::ALL {
            write!(
                f,
                "{:<12} {:>8}{:<4}",
                metric.label(),
                fmt1(Some(latest.band(metric).avg)),
                metric.unit()
            )?;
            if let Some(e) = extent(&charted, metric).filter(|e| e.min != e.max) {
                write!(f, "  range {} .. {}", fmt1(Some(e.min)), fmt1(Some(e.max)))?;
            }
            writeln!(f)?;
        }
        writeln!(f, "{:<12} {}", "Last update", format_ts(latest.ts, true))?;

        writeln!(f)?;
        let spark_points = downsample(&charted, SPARK_WIDTH);
        for metric in Metric::ALL {
            let values: Vec<f64> = spark_points.iter().map(|p| p.band(metric).avg).collect();
            writeln!(f, "{:<12} {}", metric.label(), sparkline(&values))?;
        }
        if let (Some(first), Some(last)) = (spark_points.first(), spark_points.last()) {
            let with_date = self.preset.spans_days();
            writeln!(
                f,
                "{:<12} {} .. {}",
                "",
                format_ts(first.ts, with_date),
                format_ts(last.ts, with_date)
            )?;
        }

        writeln!(f)?;
        writeln!(f, "{:<22} {:>10} {:>10} {:>8}", "Time", "Temp °C", "Hum %", "AQI")?;
        for point in all.iter().rev().take(TABLE_ROWS) {
            writeln!(
                f,
                "{:<22} {:>10} {:>10} {:>8}",
                format_ts(point.ts, true),
                fmt1(Some(point.temperature.avg)),
                fmt1(Some(point.humidity.avg)),
                fmt1(Some(point.aqi.avg)),
            )?;
        }
        Ok(())
    }
}
