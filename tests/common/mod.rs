#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use anyhow::{Result, bail};
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use home_pi_collector::{
    pi::{Device, Reading, Sensor, SensorKey},
    store::{DeviceRegistry, InsertSummary, MeasurementStore},
};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;

#[derive(Debug, Default)]
struct Tables {
    devices: BTreeMap<String, Device>,
    sensors: Vec<Sensor>,
    readings: BTreeMap<(i32, DateTime<Utc>), Reading>,
    fail_inserts: bool,
}

/// Registry and store kept in memory. Readings are unique on
/// `(sensor_id, measured_at)`, like the `readings` primary key.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn add_device(&self, device_id: &str, name: &str, address: &str) {
        self.tables.lock().unwrap().devices.insert(
            device_id.to_string(),
            Device {
                device_id: device_id.to_string(),
                name: name.to_string(),
                address: address.to_string(),
            },
        );
    }

    pub fn add_sensor(&self, sensor_id: i32, device_id: &str, location: &str) {
        self.tables.lock().unwrap().sensors.push(Sensor {
            sensor_id,
            device_id: device_id.to_string(),
            location: location.to_string(),
            sensor_type: "bme680".to_string(),
            pin: None,
        });
    }

    pub fn fail_inserts(&self) {
        self.tables.lock().unwrap().fail_inserts = true;
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.tables.lock().unwrap().readings.values().cloned().collect()
    }
}

impl DeviceRegistry for MemoryStore {
    async fn device_ids(&self) -> Result<Vec<String>> {
        Ok(self.tables.lock().unwrap().devices.keys().cloned().collect())
    }

    async fn device(&self, device_id: &str) -> Result<Option<Device>> {
        Ok(self.tables.lock().unwrap().devices.get(device_id).cloned())
    }

    async fn sensors_on_device(&self, device_id: &str) -> Result<Vec<SensorKey>> {
        let tables = self.tables.lock().unwrap();
        let Some(device) = tables.devices.get(device_id) else {
            return Ok(Vec::new());
        };

        Ok(tables
            .sensors
            .iter()
            .filter(|s| s.device_id == device_id)
            .map(|s| SensorKey {
                sensor_id: s.sensor_id,
                location: s.location.clone(),
                device_name: device.name.clone(),
            })
            .collect())
    }
}

impl MeasurementStore for MemoryStore {
    async fn latest_timestamp_for_device(&self, device_id: &str) -> Result<Option<DateTime<Utc>>> {
        let tables = self.tables.lock().unwrap();

        Ok(tables
            .readings
            .values()
            .filter(|r| {
                tables
                    .sensors
                    .iter()
                    .any(|s| s.sensor_id == r.sensor_id && s.device_id == device_id)
            })
            .map(|r| r.measured_at)
            .max())
    }

    async fn insert_readings(&self, readings: &[Reading]) -> Result<InsertSummary> {
        let mut tables = self.tables.lock().unwrap();
        if tables.fail_inserts {
            bail!("connection to store lost");
        }

        let mut inserted = 0;
        for reading in readings {
            if !tables.readings.contains_key(&reading.key()) {
                tables.readings.insert(reading.key(), reading.clone());
                inserted += 1;
            }
        }

        Ok(InsertSummary::from_attempt(readings.len(), inserted))
    }

    async fn last_reading_for_sensor(&self, sensor_id: i32) -> Result<Option<Reading>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .readings
            .values()
            .filter(|r| r.sensor_id == sensor_id)
            .max_by_key(|r| r.measured_at)
            .cloned())
    }
}

#[derive(Debug, Clone)]
pub struct FakeRow {
    pub timestamp_ms: i64,
    pub location: String,
    pub device_id: String,
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
}

impl FakeRow {
    pub fn new(device_id: &str, location: &str, timestamp_ms: i64, temperature_celsius: f64) -> Self {
        Self {
            timestamp_ms,
            location: location.to_string(),
            device_id: device_id.to_string(),
            temperature_celsius,
            humidity_percent: 50.0,
        }
    }
}

#[derive(Debug, Default)]
struct AgentState {
    rows: Vec<FakeRow>,
    requests: Vec<String>,
}

/// Stand-in for the agent on a device: answers `/get_recent/<cutoff>` with
/// the rows recorded at or after the cutoff, as the column-oriented JSON the
/// real agent sends.
#[derive(Debug, Clone)]
pub struct FakeAgent {
    device_name: String,
    state: Arc<Mutex<AgentState>>,
}

impl FakeAgent {
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
            state: Arc::default(),
        }
    }

    pub fn push(&self, row: FakeRow) {
        self.state.lock().unwrap().rows.push(row);
    }

    /// Cutoffs requested so far, as sent in the URL.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub async fn serve(&self) -> SocketAddr {
        let app = Router::new()
            .route("/get_recent/:cutoff", get(get_recent))
            .with_state(self.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}

async fn get_recent(State(agent): State<FakeAgent>, Path(cutoff): Path<String>) -> Json<Value> {
    let mut state = agent.state.lock().unwrap();
    state.requests.push(cutoff.clone());

    let Ok(since) = NaiveDateTime::parse_from_str(&cutoff, "%Y%m%d%H%M%S") else {
        return Json(json!({"message": format!("bad time format: {cutoff}")}));
    };
    let since_ms = since.and_utc().timestamp_millis();

    let rows: Vec<&FakeRow> = state.rows.iter().filter(|r| r.timestamp_ms >= since_ms).collect();
    if rows.is_empty() {
        return Json(json!({"message": "no readings since cutoff"}));
    }

    let mut columns: BTreeMap<&str, Map<String, Value>> = BTreeMap::new();
    for (index, row) in rows.iter().enumerate() {
        let index = index.to_string();
        let cells = [
            ("datetime", json!(row.timestamp_ms)),
            ("location", json!(row.location)),
            ("sensortype", json!("bme680")),
            ("piname", json!(agent.device_name)),
            ("piid", json!(row.device_id)),
            ("temp", json!(row.temperature_celsius)),
            ("humidity", json!(row.humidity_percent)),
            ("pressure", Value::Null),
            ("gasvoc", Value::Null),
        ];
        for (column, value) in cells {
            columns.entry(column).or_default().insert(index.clone(), value);
        }
    }

    Json(json!(columns))
}

/// An address nothing listens on.
pub async fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// An address that accepts connections but never answers.
pub async fn silent_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });
    addr
}
