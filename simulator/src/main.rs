mod reading;

use anyhow::{Context, Result};
use clap::Parser;
use reading::Device;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Simulated sensor fleet posting readings to the ingestion endpoint.
#[derive(Debug, Parser)]
#[command(name = "simulator", version)]
struct Args {
    /// Base URL of the telemetry API
    #[arg(long, env = "INGEST_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Shared secret sent in `x-api-key`
    #[arg(long, env = "INGEST_API_KEY")]
    api_key: String,

    /// Number of simulated devices
    #[arg(long, env = "DEVICES", default_value_t = 3)]
    devices: usize,

    /// Seconds between readings of one device
    #[arg(long, env = "INTERVAL_SECS", default_value_t = 10)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let endpoint = format!("{}/ingest", args.url.trim_end_matches('/'));

    info!("Starting IoT Simulator");
    info!(
        "Endpoint: {}, Devices: {}, Interval: {}s",
        endpoint, args.devices, args.interval_secs
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let mut rng = rand::thread_rng();
    let mut devices: Vec<Device> = (0..args.devices)
        .map(|i| Device::new(format!("dev-{}", i + 1), &mut rng))
        .collect();

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    let mut counter = 0u64;
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for device in devices.iter_mut() {
                    let reading = device.sample(&mut rng);
                    if post(&client, &endpoint, &args.api_key, &reading).await {
                        counter += 1;
                    }
                }
                ticks += 1;
                // Log progress periodically
                if ticks % 30 == 0 {
                    info!("Published {} readings", counter);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, published {} readings", counter);
                return Ok(());
            }
        }
    }
}

/// Sends one reading. Failures are logged and not retried.
async fn post(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    reading: &reading::Reading,
) -> bool {
    match client
        .post(endpoint)
        .header("x-api-key", api_key)
        .json(reading)
        .send()
        .await
    {
        Ok(resp) if resp.status() == StatusCode::CREATED => true,
        Ok(resp) => {
            warn!("Ingest of {} rejected: {}", reading.device_id, resp.status());
            false
        }
        Err(e) => {
            error!("Failed to publish: {}", e);
            false
        }
    }
}
