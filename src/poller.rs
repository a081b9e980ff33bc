//! The ingestion loop.
//!
//! Every cycle visits each registered device in sorted order: derive its
//! cursor from what is already stored, fetch everything newer from the device,
//! and insert it. A device that is unreachable or sends a bad payload is logged
//! and skipped; only a storage failure stops the loop.

use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::PollError;
use crate::fetch::{FetchClient, Fetched};
use crate::store::{DeviceRegistry, InsertSummary, MeasurementStore};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Truncates to the whole second and moves one second forward, or `None`
/// past the last representable time.
///
/// The store keeps sub-second precision while devices filter on whole
/// seconds, so the cutoff must land strictly after the stored reading.
pub fn round_up_to_next_second(timestamp: DateTime<Utc>) -> Option<DateTime<Utc>> {
    timestamp
        .trunc_subsecs(0)
        .checked_add_signed(TimeDelta::seconds(1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    Stored(InsertSummary),
    Empty,
    Unreachable(String),
}

#[derive(Debug, Default)]
pub struct CycleReport {
    /// Devices polled without error, including unreachable ones.
    pub polled: Vec<String>,
    pub inserted: u64,
    pub skipped: u64,
    pub unreachable: Vec<String>,
    pub failed: Vec<String>,
    /// Shutdown was requested before every device was visited.
    pub interrupted: bool,
}

impl CycleReport {
    fn record(&mut self, device_id: String, outcome: DeviceOutcome) {
        match outcome {
            DeviceOutcome::Stored(summary) => {
                self.inserted += summary.inserted;
                self.skipped += summary.skipped;
            }
            DeviceOutcome::Empty => {}
            DeviceOutcome::Unreachable(_) => self.unreachable.push(device_id.clone()),
        }
        self.polled.push(device_id);
    }
}

pub struct Poller<R, S> {
    registry: R,
    store: S,
    client: FetchClient,
    interval: Duration,
}

impl<R: DeviceRegistry, S: MeasurementStore> Poller<R, S> {
    pub fn new(registry: R, store: S, client: FetchClient, interval: Duration) -> Self {
        Self {
            registry,
            store,
            client,
            interval,
        }
    }

    /// Latest stored timestamp for the device, or the Unix epoch for a device
    /// with nothing stored yet.
    pub async fn cursor_for(&self, device_id: &str) -> Result<DateTime<Utc>, PollError> {
        let latest = self
            .store
            .latest_timestamp_for_device(device_id)
            .await
            .map_err(PollError::Storage)?;

        Ok(match latest {
            Some(latest) => {
                debug!("most recent record for device {device_id} at {latest}");
                latest
            }
            None => {
                debug!("no readings stored for device {device_id}, starting from the epoch");
                DateTime::<Utc>::UNIX_EPOCH
            }
        })
    }

    pub async fn poll_device(&self, device_id: &str) -> Result<DeviceOutcome, PollError> {
        let cursor = self.cursor_for(device_id).await?;
        let cutoff = round_up_to_next_second(cursor).ok_or(PollError::CursorOutOfRange(cursor))?;
        debug!("fetching data for device {device_id} since {cutoff}");

        let readings = match self
            .client
            .fetch_recent(&self.registry, device_id, cutoff)
            .await?
        {
            Fetched::Readings(readings) if !readings.is_empty() => readings,
            Fetched::Readings(_) | Fetched::Empty => {
                debug!("no new data from device {device_id}");
                return Ok(DeviceOutcome::Empty);
            }
            Fetched::Unreachable { message } => {
                warn!("skipping device {device_id}: {message}");
                return Ok(DeviceOutcome::Unreachable(message));
            }
        };

        debug!("saving {} readings from device {device_id}", readings.len());
        let summary = self
            .store
            .insert_readings(&readings)
            .await
            .map_err(PollError::Storage)?;
        if summary.skipped > 0 {
            warn!(
                "device {device_id}: {} readings since {cutoff} were already stored",
                summary.skipped
            );
        }

        Ok(DeviceOutcome::Stored(summary))
    }

    /// Polls every registered device once.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> Result<CycleReport> {
        let mut device_ids = self
            .registry
            .device_ids()
            .await
            .context("failed to list devices")?;
        device_ids.sort();
        device_ids.dedup();
        debug!("device ids {device_ids:?}");

        let mut report = CycleReport::default();
        for device_id in device_ids {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }

            match self.poll_device(&device_id).await {
                Ok(outcome) => report.record(device_id, outcome),
                Err(err) if err.is_fatal() => {
                    return Err(err).with_context(|| format!("failed to poll device {device_id}"));
                }
                Err(err) => {
                    error!(
                        "failed to poll device {device_id}: {:#}",
                        anyhow::Error::new(err)
                    );
                    report.failed.push(device_id);
                }
            }
        }

        Ok(report)
    }

    /// Runs cycles until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("polling devices every {}s", self.interval.as_secs());

        loop {
            let report = self.run_cycle(&shutdown).await?;
            info!(
                "cycle done: {} devices polled, {} readings stored, {} duplicates, {} unreachable, {} failed",
                report.polled.len(),
                report.inserted,
                report.skipped,
                report.unreachable.len(),
                report.failed.len()
            );
            if report.interrupted {
                break;
            }

            tokio::select! {
                _ = sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }

        info!("ingestion loop stopped");
        Ok(())
    }
}
