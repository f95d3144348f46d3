use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use dashboard::client::ApiClient;
use dashboard::range::{RangePreset, DEFAULT_RANGE};
use dashboard::view::Snapshot;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Terminal dashboard for the sensor read API")]
struct Args {
    /// Base URL of the API server
    #[arg(long, env = "DASHBOARD_URL", default_value = "http://localhost:8080")]
    url: String,

    #[arg(long, env = "DASHBOARD_API_KEY")]
    key: String,

    /// Device to show; defaults to the first known device
    #[arg(long, env = "DEVICE_ID")]
    device: Option<String>,

    #[arg(long, default_value = DEFAULT_RANGE)]
    range: String,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 30)]
    interval_secs: u64,
}

enum Command {
    Refresh,
    Range(String),
    Device(String),
    Devices,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some(("range", arg)) => Command::Range(arg.trim().to_string()),
        Some(("device", arg)) => Command::Device(arg.trim().to_string()),
        _ => match line {
            "" | "r" => Command::Refresh,
            "devices" => Command::Devices,
            "q" | "quit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        },
    }
}

/// Keeps the current device while it is still listed, otherwise the first one.
fn pick_device(current: Option<String>, devices: &[String]) -> Option<String> {
    current
        .filter(|d| devices.contains(d))
        .or_else(|| devices.first().cloned())
}

struct Dashboard {
    client: ApiClient,
    devices: Vec<String>,
    device: Option<String>,
    preset: RangePreset,
}

impl Dashboard {
    async fn load_devices(&mut self) {
        match self.client.devices().await {
            Ok(devices) => {
                info!("{} device(s) known", devices.len());
                self.device = pick_device(self.device.take(), &devices);
                self.devices = devices;
            }
            Err(e) => error!("Failed to load devices: {:#}", e),
        }
    }

    /// One fetch-and-render cycle. Errors are reported and the previous
    /// screen is left alone.
    async fn poll(&self) {
        let Some(device_id) = self.device.clone() else {
            println!("No devices yet.");
            return;
        };

        match self.client.readings(&device_id, self.preset, Utc::now()).await {
            Ok(page) => {
                let snapshot = Snapshot {
                    device_id,
                    preset: self.preset,
                    page,
                };
                println!("{}", snapshot);
            }
            Err(e) => error!("Failed to load readings for {}: {:#}", device_id, e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if !RangePreset::is_known(&args.range) {
        warn!("Unknown range {:?}, using {}", args.range, RangePreset::find(&args.range).name);
    }

    let mut dashboard = Dashboard {
        client: ApiClient::new(&args.url, args.key)?,
        devices: Vec::new(),
        device: args.device,
        preset: RangePreset::find(&args.range),
    };

    info!("Dashboard polling {} every {}s", args.url, args.interval_secs);
    info!("Commands: <enter>|r refresh, range <15m|30m|1h|6h|24h|7d|30d>, device <id>, devices, q");

    dashboard.load_devices().await;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => dashboard.poll().await,
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                        continue;
                    }
                };

                match parse_command(&line) {
                    Command::Refresh => dashboard.poll().await,
                    Command::Range(name) => {
                        if !RangePreset::is_known(&name) {
                            warn!("Unknown range {:?}", name);
                        }
                        dashboard.preset = RangePreset::find(&name);
                        dashboard.poll().await;
                    }
                    Command::Device(id) => {
                        if !dashboard.devices.contains(&id) {
                            warn!("Device {:?} is not in the device list", id);
                        }
                        dashboard.device = Some(id);
                        dashboard.poll().await;
                    }
                    Command::Devices => {
                        dashboard.load_devices().await;
                        println!("{}", dashboard.devices.join("\n"));
                    }
                    Command::Quit => break,
                    Command::Unknown(other) => warn!("Unknown command {:?}", other),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Dashboard stopped");
    Ok(())
}
