use crate::model::ReadingsPage;
use crate::range::{bucket_for_range, RangePreset, REQUEST_LIMIT};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const DASHBOARD_KEY_HEADER: &str = "x-dashboard-key";

#[derive(Debug, Deserialize)]
struct DevicesEnvelope {
    #[serde(default)]
    devices: Vec<String>,
}

/// Read-API client. No retries; the next poll tick is the retry.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let resp = self
            .http
            .get(&url)
            .header(DASHBOARD_KEY_HEADER, &self.key)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or(""));
        }
        resp.json().await.context("invalid JSON response")
    }

    /// Known devices, sorted.
    pub async fn devices(&self) -> Result<Vec<String>> {
        let envelope: DevicesEnvelope =
            serde_json::from_value(self.get_json("/api/devices", &[]).await?)?;
        let mut devices = envelope.devices;
        devices.sort();
        Ok(devices)
    }

    /// Readings of `device_id` over `preset` ending at `now`.
    pub async fn readings(
        &self,
        device_id: &str,
        preset: RangePreset,
        now: DateTime<Utc>,
    ) -> Result<ReadingsPage> {
        let envelope = self
            .get_json("/api/readings", &readings_query(device_id, preset, now))
            .await?;
        ReadingsPage::decode(envelope).context("unexpected readings response")
    }
}

pub fn readings_query(
    device_id: &str,
    preset: RangePreset,
    now: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    let (from, to) = preset.window(now);
    vec![
        ("deviceId", device_id.to_string()),
        ("from", from.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ("to", to.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ("limit", REQUEST_LIMIT.to_string()),
        ("bucket", bucket_for_range(preset.name).to_string()),
    ]
}
