//! Collaborator interfaces the ingestion core talks to.
//!
//! `DeviceRegistry` is read-only metadata about devices and their sensors.
//! `MeasurementStore` holds readings keyed by `(sensor_id, measured_at)` and is
//! the only place that uniqueness is enforced.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::pi::{Device, Reading, SensorKey};

pub trait DeviceRegistry {
    fn device_ids(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn device(&self, device_id: &str) -> impl Future<Output = Result<Option<Device>>> + Send;

    fn sensors_on_device(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Vec<SensorKey>>> + Send;
}

pub trait MeasurementStore {
    /// Latest `measured_at` among all sensors owned by the device, or `None`
    /// when nothing has been stored for it yet.
    fn latest_timestamp_for_device(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>>> + Send;

    /// Inserts readings, skipping any whose key is already stored.
    ///
    /// Duplicates are reported through [`InsertSummary::skipped`], never as an
    /// error. An `Err` means the store itself failed.
    fn insert_readings(
        &self,
        readings: &[Reading],
    ) -> impl Future<Output = Result<InsertSummary>> + Send;

    fn last_reading_for_sensor(
        &self,
        sensor_id: i32,
    ) -> impl Future<Output = Result<Option<Reading>>> + Send;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: u64,

    pub skipped: u64,
}

impl InsertSummary {
    pub fn from_attempt(attempted: usize, inserted: u64) -> Self {
        Self {
            inserted,
            skipped: (attempted as u64).saturating_sub(inserted),
        }
    }
}
