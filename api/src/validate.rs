use crate::model::NewReading;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const MEASUREMENTS: [&str; 3] = ["temperature", "humidity", "aqi"];

/// Field-level validation report returned with a 422.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDetails {
    pub form_errors: Vec<String>,
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationDetails {
    fn form(message: String) -> Self {
        Self {
            form_errors: vec![message],
            ..Self::default()
        }
    }

    fn field(&mut self, name: &str, message: impl Into<String>) {
        self.field_errors
            .entry(name.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }
}

/// Validates an ingestion payload into a typed reading.
///
/// A missing timestamp takes `now`. The timestamp is read from `timestamp`,
/// falling back to the legacy `ts` key.
pub fn validate_payload(
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<NewReading, ValidationDetails> {
    let Some(object) = payload.as_object() else {
        return Err(ValidationDetails::form(format!(
            "Expected object, received {}",
            type_name(payload)
        )));
    };

    let mut details = ValidationDetails::default();

    let device_id = match object.get("deviceId") {
        None => {
            details.field("deviceId", "Required");
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            details.field("deviceId", "String must contain at least 1 character(s)");
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            details.field(
                "deviceId",
                format!("Expected string, received {}", type_name(other)),
            );
            None
        }
    };

    let [temperature, humidity, aqi] = MEASUREMENTS.map(|name| number(object, name, &mut details));
    let timestamp = timestamp(object, &mut details);

    match (device_id, temperature, humidity, aqi, timestamp) {
        (Some(device_id), Some(temperature), Some(humidity), Some(aqi), Some(timestamp))
            if details.is_empty() =>
        {
            Ok(NewReading {
                device_id,
                timestamp: timestamp.unwrap_or(now),
                temperature,
                humidity,
                aqi,
            })
        }
        _ => Err(details),
    }
}

fn number(object: &Map<String, Value>, name: &str, details: &mut ValidationDetails) -> Option<f64> {
    match object.get(name) {
        None => {
            details.field(name, "Required");
            None
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(other) => {
            details.field(name, format!("Expected number, received {}", type_name(other)));
            None
        }
    }
}

/// `Some(None)` means the timestamp was omitted.
fn timestamp(
    object: &Map<String, Value>,
    details: &mut ValidationDetails,
) -> Option<Option<DateTime<Utc>>> {
    let (name, value) = match (object.get("timestamp"), object.get("ts")) {
        (Some(v), _) => ("timestamp", v),
        (None, Some(v)) => ("ts", v),
        (None, None) => return Some(None),
    };

    match value {
        Value::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(ts) => Some(Some(ts.with_timezone(&Utc))),
            Err(_) => {
                details.field(name, "Invalid datetime");
                None
            }
        },
        other => {
            details.field(name, format!("Expected string, received {}", type_name(other)));
            None
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
