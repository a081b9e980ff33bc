use std::io::Read;

use anyhow::{Context as _, Result};
use csv::Reader;
use home_pi_collector::pi::{Device, Sensor};
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Deserialize)]
struct DeviceRecord {
    id: String,
    name: String,
    ipaddress: String,
}

impl From<DeviceRecord> for Device {
    fn from(record: DeviceRecord) -> Self {
        Device {
            device_id: record.id,
            name: record.name,
            address: record.ipaddress,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SensorRecord {
    id: i32,
    location: String,
    #[serde(rename = "type")]
    sensor_type: String,
    pin: Option<i32>,
    piid: String,
}

impl From<SensorRecord> for Sensor {
    fn from(record: SensorRecord) -> Self {
        Sensor {
            sensor_id: record.id,
            device_id: record.piid,
            location: record.location,
            sensor_type: record.sensor_type,
            pin: record.pin,
        }
    }
}

pub fn read_devices<R: Read>(reader: R) -> Result<Vec<Device>> {
    read_records::<DeviceRecord, _>(reader)
        .map(|records| records.into_iter().map(Device::from).collect())
}

pub fn read_sensors<R: Read>(reader: R) -> Result<Vec<Sensor>> {
    read_records::<SensorRecord, _>(reader)
        .map(|records| records.into_iter().map(Sensor::from).collect())
}

fn read_records<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut reader = Reader::from_reader(reader);

    reader
        .deserialize()
        .enumerate()
        .map(|(i, record)| record.with_context(|| format!("failed to parse CSV record {}", i + 1)))
        .collect()
}
