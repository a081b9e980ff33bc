use std::{net::SocketAddr, time::Duration};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::debug;

use crate::error::PollError;
use crate::normalize::normalize;
use crate::pi::Reading;
use crate::store::DeviceRegistry;

/// Format of the cutoff segment in `/get_recent/<cutoff>`.
pub const CUTOFF_FORMAT: &str = "%Y%m%d%H%M%S";

pub const DEFAULT_PORT: u16 = 5003;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum Fetched {
    Readings(Vec<Reading>),

    /// The device answered but had nothing new (an empty table or its own
    /// `{"message": ...}` error object).
    Empty,

    /// The device could not be reached. Routine for devices that are off or
    /// still booting.
    Unreachable { message: String },
}

/// HTTP client for the agent running on each device.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    port: u16,
    timezone: Tz,
}

impl FetchClient {
    pub fn new(port: u16, timeout: Duration, timezone: Tz) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            port,
            timezone,
        })
    }

    pub fn format_cutoff(&self, cutoff: DateTime<Utc>) -> String {
        cutoff
            .with_timezone(&self.timezone)
            .format(CUTOFF_FORMAT)
            .to_string()
    }

    /// URL asking the device for everything since `cutoff`.
    ///
    /// An address given as `ip:port` keeps its own port; anything else is
    /// treated as a host and gets the client's port.
    pub fn recent_url(&self, address: &str, cutoff: DateTime<Utc>) -> String {
        let authority = match address.parse::<SocketAddr>() {
            Ok(addr) => addr.to_string(),
            Err(_) => format!("{address}:{}", self.port),
        };
        format!(
            "http://{authority}/get_recent/{}",
            self.format_cutoff(cutoff)
        )
    }

    /// Fetches every reading the device has recorded since `cutoff`.
    ///
    /// Connection failures and timeouts come back as [`Fetched::Unreachable`]
    /// rather than an error. Nothing is written to storage here.
    pub async fn fetch_recent<R: DeviceRegistry>(
        &self,
        registry: &R,
        device_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Fetched, PollError> {
        let device = registry
            .device(device_id)
            .await
            .map_err(PollError::Storage)?
            .ok_or_else(|| PollError::UnknownDevice(device_id.to_string()))?;

        let url = self.recent_url(&device.address, cutoff);
        debug!("fetching data from {url}");

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() || err.is_timeout() => {
                debug!("connection error from {}: {err:#}", device.address);
                return Ok(Fetched::Unreachable {
                    message: format!("could not connect to {}", device.address),
                });
            }
            Err(source) => return Err(PollError::Request { url, source }),
        };

        let payload: Value = response
            .json()
            .await
            .map_err(|source| PollError::Response {
                url: url.clone(),
                source,
            })?;

        let len = payload_len(&payload);
        debug!("received json with length {len}");
        if len <= 1 {
            debug!("contents of json: {payload}, nothing to store");
            return Ok(Fetched::Empty);
        }

        let readings = normalize(registry, device_id, payload).await?;

        Ok(Fetched::Readings(readings))
    }
}

fn payload_len(payload: &Value) -> usize {
    match payload {
        Value::Null => 0,
        Value::Object(columns) => columns.len(),
        Value::Array(items) => items.len(),
        _ => 1,
    }
}
