use crate::auth::{check_ingest_key, require_dashboard_key};
use crate::bucket::Bucket;
use crate::config::ApiKeys;
use crate::errors::ApiError;
use crate::metrics::{
    gather_metrics, INGEST_REQUESTS_TOTAL, QUERY_LATENCY_SECONDS, READINGS_REJECTED_TOTAL,
    READINGS_STORED_TOTAL,
};
use crate::model::{
    DevicesResponse, IngestResponse, LatestResponse, RangeQuery, ReadingsPage, ReadingsResponse,
};
use crate::store::ReadingStore;
use crate::validate::validate_payload;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::IntErrorKind;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub const DEFAULT_LIMIT: usize = 5000;
pub const MAX_LIMIT: usize = 20_000;
pub const DEFAULT_WINDOW_HOURS: i64 = 6;

/// Handles every request needs. Built once in `main` and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub keys: Arc<ApiKeys>,
    pub tz: Tz,
}

impl AppState {
    pub fn new(store: Arc<dyn ReadingStore>, keys: ApiKeys, tz: Tz) -> Self {
        Self {
            store,
            keys: Arc::new(keys),
            tz,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    #[serde(rename = "deviceId")]
    device_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    limit: Option<String>,
    bucket: Option<String>,
}

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    let dashboard_api = Router::new()
        .route("/devices", get(get_devices))
        .route("/latest", get(get_latest))
        .route("/readings", get(get_readings))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_dashboard_key,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route(
            "/ingest",
            post(ingest).layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .nest("/api", dashboard_api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn metrics_handler() -> String {
    gather_metrics()
}

async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    INGEST_REQUESTS_TOTAL.inc();

    if let Err(e) = check_ingest_key(&headers, state.keys.ingest.as_deref()) {
        READINGS_REJECTED_TOTAL.with_label_values(&["unauthorized"]).inc();
        return Err(e);
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejected ingest body: {}", e);
        READINGS_REJECTED_TOTAL.with_label_values(&["invalid_json"]).inc();
        ApiError::InvalidJson
    })?;

    let reading = validate_payload(&payload, Utc::now()).map_err(|details| {
        debug!("Rejected ingest payload: {:?}", details);
        READINGS_REJECTED_TOTAL.with_label_values(&["invalid"]).inc();
        ApiError::Validation(details)
    })?;

    let device_id = reading.device_id.clone();
    let id = state.store.insert(reading).await?;
    READINGS_STORED_TOTAL.inc();
    debug!("Stored reading {} for device {}", id, device_id);

    Ok((StatusCode::CREATED, Json(IngestResponse { ok: true, id })))
}

async fn get_devices(State(state): State<AppState>) -> Result<Json<DevicesResponse>, ApiError> {
    let devices = state.store.devices().await?;
    Ok(Json(DevicesResponse { ok: true, devices }))
}

async fn get_latest(State(state): State<AppState>) -> Result<Json<LatestResponse>, ApiError> {
    let latest = state.store.latest().await?;
    Ok(Json(LatestResponse { ok: true, latest }))
}

async fn get_readings(
    State(state): State<AppState>,
    Query(params): Query<ReadingsQuery>,
) -> Result<Json<ReadingsResponse>, ApiError> {
    let now = Utc::now();
    let query = range_query(&params, now)?;
    let bucket = params.bucket.as_deref().and_then(Bucket::parse);
    if let (None, Some(raw)) = (bucket, present(&params.bucket)) {
        // Unrecognized bucket strings are answered in raw mode
        debug!("Ignoring bucket {:?} for device {}", raw, query.device_id);
    }

    let started = Instant::now();
    let page = match bucket {
        Some(bucket) => {
            let readings = state.store.aggregated(&query, bucket, state.tz).await?;
            QUERY_LATENCY_SECONDS
                .with_label_values(&["aggregated"])
                .observe(started.elapsed().as_secs_f64());
            ReadingsPage::Aggregated {
                bucket: bucket.to_string(),
                device_id: query.device_id,
                from: query.from,
                to: query.to,
                count: readings.len(),
                readings,
            }
        }
        None => {
            let readings = state.store.raw(&query).await?;
            QUERY_LATENCY_SECONDS
                .with_label_values(&["raw"])
                .observe(started.elapsed().as_secs_f64());
            ReadingsPage::Raw {
                device_id: query.device_id,
                from: query.from,
                to: query.to,
                count: readings.len(),
                readings,
            }
        }
    };

    Ok(Json(ReadingsResponse { ok: true, page }))
}

fn range_query(params: &ReadingsQuery, now: DateTime<Utc>) -> Result<RangeQuery, ApiError> {
    let device_id = params
        .device_id
        .as_deref()
        .filter(|d| !d.is_empty())
        .ok_or(ApiError::BadRequest("deviceId is required"))?;

    let from = match present(&params.from) {
        Some(s) => parse_instant(s),
        None => Some(now - Duration::hours(DEFAULT_WINDOW_HOURS)),
    };
    let to = match present(&params.to) {
        Some(s) => parse_instant(s),
        None => Some(now),
    };
    let (Some(from), Some(to)) = (from, to) else {
        warn!("Invalid from/to in readings query for device {}", device_id);
        return Err(ApiError::BadRequest("Invalid from/to datetime"));
    };

    Ok(RangeQuery {
        device_id: device_id.to_string(),
        from,
        to,
        limit: parse_limit(present(&params.limit)),
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Leading integer, defaulting when absent or non-positive, capped at [`MAX_LIMIT`].
pub fn parse_limit(value: Option<&str>) -> usize {
    let Some(value) = value else {
        return DEFAULT_LIMIT;
    };
    let value = value.trim_start();
    let digits_end = value
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(value.len());

    match value[..digits_end].parse::<i64>() {
        Ok(n) if n > 0 => usize::try_from(n).unwrap_or(MAX_LIMIT).min(MAX_LIMIT),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => MAX_LIMIT,
        _ => DEFAULT_LIMIT,
    }
}

/// Accepts RFC 3339, naive date-times and dates (as UTC), or epoch milliseconds.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|d| Utc.from_utc_datetime(&d));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("3000")), 3000);
        assert_eq!(parse_limit(Some("25000")), MAX_LIMIT);
        assert_eq!(parse_limit(Some("12abc")), 12);
        assert_eq!(parse_limit(Some("abc")), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("0")), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("-5")), DEFAULT_LIMIT);
        assert_eq!(parse_limit(Some("99999999999999999999")), MAX_LIMIT);
    }

    #[test]
    fn test_parse_instant_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        assert_eq!(parse_instant("2024-05-01T10:30:00Z"), Some(expected));
        assert_eq!(parse_instant("2024-05-01T10:30:00.000Z"), Some(expected));
        assert_eq!(parse_instant("2024-05-01T12:30:00+02:00"), Some(expected));
        assert_eq!(parse_instant("2024-05-01T10:30:00"), Some(expected));
        assert_eq!(parse_instant("2024-05-01T10:30"), Some(expected));
        assert_eq!(parse_instant(&expected.timestamp_millis().to_string()), Some(expected));
        assert_eq!(
            parse_instant("2024-05-01"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_instant("not a date"), None);
        assert_eq!(parse_instant("2024-13-01"), None);
    }

    #[test]
    fn test_range_query_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let params = ReadingsQuery {
            device_id: Some("dev1".to_string()),
            from: Some(String::new()),
            ..ReadingsQuery::default()
        };

        let query = range_query(&params, now).unwrap();
        assert_eq!(query.from, now - Duration::hours(6));
        assert_eq!(query.to, now);
        assert_eq!(query.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_range_query_errors() {
        let now = Utc::now();
        let missing = ReadingsQuery::default();
        assert!(matches!(
            range_query(&missing, now),
            Err(ApiError::BadRequest("deviceId is required"))
        ));

        let bad_from = ReadingsQuery {
            device_id: Some("dev1".to_string()),
            from: Some("garbage".to_string()),
            ..ReadingsQuery::default()
        };
        assert!(matches!(
            range_query(&bad_from, now),
            Err(ApiError::BadRequest("Invalid from/to datetime"))
        ));
    }
}
