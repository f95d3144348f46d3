use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};

mod common;
use common::{app, dashboard_get, ingest, send, DASHBOARD_KEY};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn ingest_at(app: &Router, device_id: &str, ts: DateTime<Utc>, temperature: f64) {
    let payload = json!({
        "deviceId": device_id,
        "temperature": temperature,
        "humidity": 40.0 + temperature,
        "aqi": 10.0 + temperature,
        "timestamp": iso(ts),
    });
    let (status, _) = ingest(app, &payload).await;
    assert_eq!(status, StatusCode::CREATED);
}

/// Twelve readings five minutes apart, starting at `base()`.
async fn seed_hour(app: &Router) {
    for i in 0..12 {
        ingest_at(app, "dev1", base() + Duration::minutes(5 * i), 20.0 + i as f64).await;
    }
}

fn readings_uri(extra: &str) -> String {
    format!(
        "/api/readings?deviceId=dev1&from={}&to={}{}",
        iso(base()),
        iso(base() + Duration::hours(1)),
        extra
    )
}

#[tokio::test]
async fn test_aggregated_five_minute_buckets() {
    let app = app();
    seed_hour(&app).await;

    let (status, body) = send(&app, dashboard_get(&readings_uri("&bucket=5m"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["mode"], "aggregated");
    assert_eq!(body["bucket"], "5m");
    assert_eq!(body["deviceId"], "dev1");
    assert_eq!(body["count"], 12);

    let buckets = body["readings"].as_array().unwrap();
    assert_eq!(buckets.len(), 12);

    let mut previous: Option<DateTime<Utc>> = None;
    for bucket in buckets {
        let ts: DateTime<Utc> = bucket["ts"].as_str().unwrap().parse().unwrap();
        if let Some(previous) = previous {
            assert!(ts > previous);
        }
        previous = Some(ts);

        for field in ["temperature", "humidity", "aqi"] {
            let avg = bucket[format!("{field}Avg")].as_f64().unwrap();
            let min = bucket[format!("{field}Min")].as_f64().unwrap();
            let max = bucket[format!("{field}Max")].as_f64().unwrap();
            let range = bucket[format!("{field}Range")].as_f64().unwrap();
            assert!(min <= avg && avg <= max);
            assert_eq!(range, max - min);
        }
    }
}

#[tokio::test]
async fn test_aggregated_wider_buckets_merge_readings() {
    let app = app();
    seed_hour(&app).await;

    let (_, body) = send(&app, dashboard_get(&readings_uri("&bucket=30m"))).await;
    assert_eq!(body["mode"], "aggregated");
    assert_eq!(body["bucket"], "30m");

    let buckets = body["readings"].as_array().unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0]["temperatureMin"], 20.0);
    assert_eq!(buckets[0]["temperatureMax"], 25.0);
    assert_eq!(buckets[0]["temperatureAvg"], 22.5);
    assert_eq!(buckets[0]["temperatureRange"], 5.0);
    assert_eq!(buckets[1]["temperatureMin"], 26.0);
}

#[tokio::test]
async fn test_invalid_bucket_falls_back_to_raw() {
    let app = app();
    seed_hour(&app).await;

    for bucket in ["3x", "0m", "1d", "5", "abc"] {
        let (status, body) =
            send(&app, dashboard_get(&readings_uri(&format!("&bucket={bucket}")))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "raw", "bucket {bucket}");
        assert!(body.get("bucket").is_none());

        let rows = body["readings"].as_array().unwrap();
        assert_eq!(rows.len(), 12);
        assert!(rows[0].get("temperatureAvg").is_none());
        assert_eq!(rows[0]["temperature"], 20.0);
    }
}

#[tokio::test]
async fn test_raw_mode_window_order_and_limit() {
    let app = app();
    // Inserted out of order, plus readings outside the window and for another device
    for i in [7, 2, 9, 0, 4] {
        ingest_at(&app, "dev1", base() + Duration::minutes(i), i as f64).await;
    }
    ingest_at(&app, "dev1", base() - Duration::minutes(1), 100.0).await;
    ingest_at(&app, "dev1", base() + Duration::hours(2), 100.0).await;
    ingest_at(&app, "dev2", base() + Duration::minutes(3), 100.0).await;

    let (_, body) = send(&app, dashboard_get(&readings_uri(""))).await;
    assert_eq!(body["mode"], "raw");
    let temps: Vec<f64> = body["readings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["temperature"].as_f64().unwrap())
        .collect();
    assert_eq!(temps, vec![0.0, 2.0, 4.0, 7.0, 9.0]);

    let (_, body) = send(&app, dashboard_get(&readings_uri("&limit=2"))).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["readings"][1]["temperature"], 2.0);
}

#[tokio::test]
async fn test_duplicate_timestamps_are_separate_points() {
    let app = app();
    ingest_at(&app, "dev1", base(), 1.0).await;
    ingest_at(&app, "dev1", base(), 2.0).await;

    let (_, body) = send(&app, dashboard_get(&readings_uri(""))).await;
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_repeated_query_is_idempotent() {
    let app = app();
    seed_hour(&app).await;

    for extra in ["", "&bucket=10m"] {
        let (_, first) = send(&app, dashboard_get(&readings_uri(extra))).await;
        let (_, second) = send(&app, dashboard_get(&readings_uri(extra))).await;
        assert_eq!(first, second);
    }
}

#[tokio::test]
async fn test_readings_bad_requests() {
    let app = app();

    let (status, body) = send(&app, dashboard_get("/api/readings")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "deviceId is required");

    let (status, body) = send(&app, dashboard_get("/api/readings?deviceId=dev1&from=garbage")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid from/to datetime");
}

#[tokio::test]
async fn test_empty_result_is_not_an_error() {
    let app = app();

    let (status, body) = send(&app, dashboard_get("/api/readings?deviceId=ghost&bucket=5m")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
    assert_eq!(body["readings"], json!([]));
}

#[tokio::test]
async fn test_devices_and_latest() {
    let app = app();
    ingest_at(&app, "kitchen", base(), 1.0).await;
    ingest_at(&app, "attic", base() + Duration::minutes(10), 2.0).await;
    ingest_at(&app, "kitchen", base() + Duration::minutes(20), 3.0).await;
    ingest_at(&app, "attic", base(), 4.0).await;

    let (_, body) = send(&app, dashboard_get("/api/devices")).await;
    assert_eq!(body, json!({ "ok": true, "devices": ["attic", "kitchen"] }));

    let (_, body) = send(&app, dashboard_get("/api/latest")).await;
    let latest = body["latest"].as_array().unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0]["deviceId"], "attic");
    assert_eq!(latest[0]["temperature"], 2.0);
    assert_eq!(latest[1]["deviceId"], "kitchen");
    assert_eq!(latest[1]["temperature"], 3.0);
    assert_eq!(latest[1]["ts"], Value::String(iso_secs(base() + Duration::minutes(20))));
}

fn iso_secs(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[tokio::test]
async fn test_dashboard_auth() {
    let app = app();
    let request = |header: Option<(&str, String)>| {
        let mut builder = Request::builder().uri("/api/devices").method(Method::GET);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).unwrap()
    };

    let (status, body) = send(&app, request(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "ok": false, "error": "Unauthorized" }));

    let (status, _) = send(&app, request(Some(("x-dashboard-key", "nope".to_string())))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bearer = format!("Bearer {DASHBOARD_KEY}");
    let (status, _) = send(&app, request(Some(("authorization", bearer)))).await;
    assert_eq!(status, StatusCode::OK);

    let lower = format!("bearer {DASHBOARD_KEY}");
    let (status, _) = send(&app, request(Some(("authorization", lower)))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        send(&app, request(Some(("x-dashboard-key", DASHBOARD_KEY.to_string())))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_dashboard_fails_closed_without_key() {
    let app = common::app_with_keys(api::config::ApiKeys {
        ingest: Some(common::INGEST_KEY.to_string()),
        dashboard: None,
    });

    for uri in ["/api/devices", "/api/latest", "/api/readings?deviceId=dev1"] {
        let (status, body) = send(&app, dashboard_get(uri)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "DASHBOARD_API_KEY not configured");
    }

    // Health stays open
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = app();
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();

    let response = tower::ServiceExt::oneshot(app, request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
