use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref INGEST_REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "api_ingest_requests_total",
        "Total requests received on /ingest"
    ))
    .expect("valid metric options");
    pub static ref READINGS_STORED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "api_readings_stored_total",
        "Total readings persisted"
    ))
    .expect("valid metric options");
    pub static ref READINGS_REJECTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "api_readings_rejected_total",
            "Total ingestion requests rejected, by reason"
        ),
        &["reason"]
    )
    .expect("valid metric options");
    pub static ref STORE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "api_store_failures_total",
        "Total requests that failed with a server error"
    ))
    .expect("valid metric options");
    pub static ref QUERY_LATENCY_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "api_query_latency_seconds",
            "Time taken to answer a readings query"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ]),
        &["mode"]
    )
    .expect("valid metric options");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(INGEST_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_STORED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_REJECTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUERY_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
