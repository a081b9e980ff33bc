//! Turns the column-oriented JSON a device returns into canonical readings.
//!
//! A device answers with `{"<column>": {"<row index>": <value>, ...}, ...}`.
//! Rows are rebuilt from the columns, their millisecond timestamps converted,
//! joined on `(location, device name)` against the sensors registered for the
//! device, stripped of the identifying columns and deduplicated on
//! `(sensor_id, measured_at)`.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{PayloadError, PollError};
use crate::pi::{Reading, SensorKey};
use crate::store::DeviceRegistry;

/// One row as sent by the device, before sensor resolution.
///
/// The timestamp and identifying columns may be null on a broken row; such
/// rows are dropped instead of failing the whole payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReading {
    #[serde(rename = "datetime")]
    pub timestamp_ms: Option<i64>,

    pub location: Option<String>,

    #[serde(rename = "piname")]
    pub device_name: Option<String>,

    #[serde(rename = "piid")]
    pub device_id: Option<String>,

    #[serde(rename = "temp")]
    pub temperature_celsius: Option<f64>,

    #[serde(rename = "humidity")]
    pub humidity_percent: Option<f64>,

    #[serde(rename = "pressure")]
    pub pressure_hpa: Option<f64>,

    #[serde(rename = "gasvoc")]
    pub gas_resistance_ohm: Option<f64>,

    // Integral on the device, but columns holding nulls arrive as floats.
    #[serde(rename = "mcdvalue")]
    pub soil_moisture_value: Option<f64>,

    #[serde(rename = "mcdvoltage")]
    pub soil_moisture_volts: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RawRow {
    pub measured_at: DateTime<Utc>,

    pub raw: RawReading,
}

/// Rows of a payload reported by a single device.
#[derive(Debug, Clone)]
pub struct RawBatch {
    /// Device id the rows name, `None` if no row carries one.
    pub device_id: Option<String>,

    pub rows: Vec<RawRow>,
}

/// Rebuilds rows from a column-oriented payload.
///
/// Rows without a usable timestamp are dropped. Returns `Ok(None)` when no
/// rows are left.
pub fn parse_batch(payload: Value) -> Result<Option<RawBatch>, PayloadError> {
    let Value::Object(columns) = payload else {
        return Err(PayloadError::NotAnObject);
    };

    let mut cells_by_row: IndexMap<String, Map<String, Value>> = IndexMap::new();
    for (column, cells) in columns {
        let Value::Object(cells) = cells else {
            return Err(PayloadError::ColumnNotObject(column));
        };
        for (index, value) in cells {
            cells_by_row
                .entry(index)
                .or_default()
                .insert(column.clone(), value);
        }
    }
    cells_by_row.sort_by(|a, _, b, _| (a.parse::<u64>().ok(), a).cmp(&(b.parse::<u64>().ok(), b)));

    let mut rows = Vec::with_capacity(cells_by_row.len());
    for (index, cells) in cells_by_row {
        let raw: RawReading = serde_json::from_value(Value::Object(cells))
            .map_err(|source| PayloadError::Row {
                index: index.clone(),
                source,
            })?;
        let Some(measured_at) = raw.timestamp_ms.and_then(DateTime::from_timestamp_millis) else {
            warn!(
                "row {index} has no usable timestamp ({:?}), dropping row",
                raw.timestamp_ms
            );
            continue;
        };
        rows.push(RawRow { measured_at, raw });
    }
    if rows.is_empty() {
        return Ok(None);
    }

    let device_ids: BTreeSet<&str> = rows
        .iter()
        .filter_map(|r| r.raw.device_id.as_deref())
        .collect();
    if device_ids.len() > 1 {
        return Err(PayloadError::MixedDevices(
            device_ids.into_iter().map(str::to_owned).collect(),
        ));
    }
    let device_id = device_ids.first().map(|id| id.to_string());

    Ok(Some(RawBatch { device_id, rows }))
}

/// Joins the rows of `device_id` against its sensors and deduplicates the
/// result.
///
/// Rows whose `(location, device name)` is missing or does not name exactly
/// one sensor are dropped. For repeated `(sensor_id, measured_at)` keys the
/// last row wins.
pub fn resolve(device_id: &str, rows: Vec<RawRow>, sensors: &[SensorKey]) -> Vec<Reading> {
    let mut sensor_by_key: HashMap<(&str, &str), Option<i32>> = HashMap::new();
    for sensor in sensors {
        sensor_by_key
            .entry((sensor.location.as_str(), sensor.device_name.as_str()))
            .and_modify(|id| {
                if *id != Some(sensor.sensor_id) {
                    *id = None;
                }
            })
            .or_insert(Some(sensor.sensor_id));
    }

    let total = rows.len();
    let mut unresolved = 0usize;
    let mut readings: IndexMap<(i32, DateTime<Utc>), Reading> = IndexMap::new();
    for RawRow { measured_at, raw } in rows {
        let (Some(location), Some(device_name)) =
            (raw.location.as_deref(), raw.device_name.as_deref())
        else {
            unresolved += 1;
            continue;
        };
        let sensor_id = match sensor_by_key.get(&(location, device_name)) {
            Some(Some(sensor_id)) => *sensor_id,
            Some(None) => {
                warn!(
                    "ambiguous sensor for device {device_id} at {location:?} ({device_name:?}), dropping row"
                );
                unresolved += 1;
                continue;
            }
            None => {
                unresolved += 1;
                continue;
            }
        };

        let reading = Reading {
            sensor_id,
            measured_at,
            temperature_celsius: raw.temperature_celsius,
            humidity_percent: raw.humidity_percent,
            pressure_hpa: raw.pressure_hpa,
            gas_resistance_ohm: raw.gas_resistance_ohm,
            soil_moisture_value: raw.soil_moisture_value.map(|v| v.round() as i32),
            soil_moisture_volts: raw.soil_moisture_volts,
        };
        readings.insert(reading.key(), reading);
    }

    debug!(
        "device {device_id}: {total} rows fetched, {unresolved} unresolved, {} after dedup",
        readings.len()
    );

    readings.into_values().collect()
}

/// Parses a payload fetched from `device_id`, looks up its sensors and
/// returns the canonical readings.
///
/// A payload naming a different device is rejected rather than stored under
/// that device's sensors.
pub async fn normalize<R: DeviceRegistry>(
    registry: &R,
    device_id: &str,
    payload: Value,
) -> Result<Vec<Reading>, PollError> {
    let Some(batch) = parse_batch(payload)? else {
        return Ok(Vec::new());
    };
    if let Some(reported) = batch.device_id.as_deref().filter(|id| *id != device_id) {
        return Err(PollError::DeviceMismatch {
            polled: device_id.to_string(),
            reported: reported.to_string(),
        });
    }

    let sensors = registry
        .sensors_on_device(device_id)
        .await
        .map_err(PollError::Storage)?;
    debug!("sensors on device {device_id}: {sensors:?}");

    Ok(resolve(device_id, batch.rows, &sensors))
}
