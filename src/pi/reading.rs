use chrono::{DateTime, Utc};
use serde::Serialize;

/// A normalized reading, identified by `(sensor_id, measured_at)`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Reading {
    pub sensor_id: i32,

    pub measured_at: DateTime<Utc>,

    pub temperature_celsius: Option<f64>,

    pub humidity_percent: Option<f64>,

    pub pressure_hpa: Option<f64>,

    pub gas_resistance_ohm: Option<f64>,

    pub soil_moisture_value: Option<i32>,

    pub soil_moisture_volts: Option<f64>,
}

impl Reading {
    pub fn key(&self) -> (i32, DateTime<Utc>) {
        (self.sensor_id, self.measured_at)
    }
}
