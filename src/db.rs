use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio_stream::{Stream, StreamExt as _};

use crate::pi::{Device, Reading, Sensor, SensorKey};
use crate::store::{DeviceRegistry, InsertSummary, MeasurementStore};

pub async fn new_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to database")
}

pub async fn bulk_insert_readings(pool: &PgPool, readings: &[Reading]) -> Result<u64> {
    if readings.is_empty() {
        return Ok(0);
    }

    let sensor_ids: Vec<i32> = readings.iter().map(|r| r.sensor_id).collect();
    let measured_ats: Vec<DateTime<Utc>> = readings.iter().map(|r| r.measured_at).collect();
    let temperature_celsiuses: Vec<Option<f64>> =
        readings.iter().map(|r| r.temperature_celsius).collect();
    let humidity_percents: Vec<Option<f64>> =
        readings.iter().map(|r| r.humidity_percent).collect();
    let pressure_hpas: Vec<Option<f64>> = readings.iter().map(|r| r.pressure_hpa).collect();
    let gas_resistance_ohms: Vec<Option<f64>> =
        readings.iter().map(|r| r.gas_resistance_ohm).collect();
    let soil_moisture_values: Vec<Option<i32>> =
        readings.iter().map(|r| r.soil_moisture_value).collect();
    let soil_moisture_voltses: Vec<Option<f64>> =
        readings.iter().map(|r| r.soil_moisture_volts).collect();

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO readings (sensor_id, measured_at, temperature_celsius, humidity_percent, pressure_hpa, gas_resistance_ohm, soil_moisture_value, soil_moisture_volts)
        SELECT * FROM UNNEST($1::INT4[], $2::TIMESTAMPTZ[], $3::FLOAT8[], $4::FLOAT8[], $5::FLOAT8[], $6::FLOAT8[], $7::INT4[], $8::FLOAT8[])
        ON CONFLICT (sensor_id, measured_at) DO NOTHING
        "#,
    )
    .bind(sensor_ids)
    .bind(measured_ats)
    .bind(temperature_celsiuses)
    .bind(humidity_percents)
    .bind(pressure_hpas)
    .bind(gas_resistance_ohms)
    .bind(soil_moisture_values)
    .bind(soil_moisture_voltses)
    .execute(&mut *tx)
    .await
    .context("failed to execute bulk insert query")?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(result.rows_affected())
}

pub async fn bulk_insert_devices(pool: &PgPool, devices: &[Device]) -> Result<u64> {
    if devices.is_empty() {
        return Ok(0);
    }

    let device_ids: Vec<&str> = devices.iter().map(|d| d.device_id.as_str()).collect();
    let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
    let addresses: Vec<&str> = devices.iter().map(|d| d.address.as_str()).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO devices (device_id, name, address)
        SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[], $3::TEXT[])
        ON CONFLICT (device_id) DO NOTHING
        "#,
    )
    .bind(device_ids)
    .bind(names)
    .bind(addresses)
    .execute(pool)
    .await
    .context("failed to insert devices")?;

    Ok(result.rows_affected())
}

pub async fn bulk_insert_sensors(pool: &PgPool, sensors: &[Sensor]) -> Result<u64> {
    if sensors.is_empty() {
        return Ok(0);
    }

    let sensor_ids: Vec<i32> = sensors.iter().map(|s| s.sensor_id).collect();
    let device_ids: Vec<&str> = sensors.iter().map(|s| s.device_id.as_str()).collect();
    let locations: Vec<&str> = sensors.iter().map(|s| s.location.as_str()).collect();
    let sensor_types: Vec<&str> = sensors.iter().map(|s| s.sensor_type.as_str()).collect();
    let pins: Vec<Option<i32>> = sensors.iter().map(|s| s.pin).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO sensors (sensor_id, device_id, location, sensor_type, pin)
        SELECT * FROM UNNEST($1::INT4[], $2::TEXT[], $3::TEXT[], $4::TEXT[], $5::INT4[])
        ON CONFLICT (sensor_id) DO NOTHING
        "#,
    )
    .bind(sensor_ids)
    .bind(device_ids)
    .bind(locations)
    .bind(sensor_types)
    .bind(pins)
    .execute(pool)
    .await
    .context("failed to insert sensors")?;

    Ok(result.rows_affected())
}

/// Device registry and measurement store backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every sensor with its location and the name of its device.
    pub async fn sensors(&self) -> Result<Vec<SensorKey>> {
        sqlx::query_as::<_, SensorKey>(
            r#"
            SELECT s.sensor_id, s.location, d.name AS device_name
            FROM sensors s
            JOIN devices d ON d.device_id = s.device_id
            ORDER BY s.sensor_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to query sensors")
    }

    /// Streams every reading at or after `since`, oldest first.
    pub fn readings_since(&self, since: DateTime<Utc>) -> impl Stream<Item = Result<Reading>> + '_ {
        sqlx::query_as::<_, Reading>(
            r#"
            SELECT sensor_id, measured_at, temperature_celsius, humidity_percent, pressure_hpa, gas_resistance_ohm, soil_moisture_value, soil_moisture_volts
            FROM readings
            WHERE measured_at >= $1
            ORDER BY measured_at, sensor_id
            "#,
        )
        .bind(since)
        .fetch(&self.pool)
        .map(|row| row.context("failed to fetch reading"))
    }
}

impl DeviceRegistry for PgStore {
    async fn device_ids(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT device_id FROM devices ORDER BY device_id")
            .fetch_all(&self.pool)
            .await
            .context("failed to query device ids")
    }

    async fn device(&self, device_id: &str) -> Result<Option<Device>> {
        sqlx::query_as::<_, Device>(
            "SELECT device_id, name, address FROM devices WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to query device {device_id}"))
    }

    async fn sensors_on_device(&self, device_id: &str) -> Result<Vec<SensorKey>> {
        sqlx::query_as::<_, SensorKey>(
            r#"
            SELECT s.sensor_id, s.location, d.name AS device_name
            FROM sensors s
            JOIN devices d ON d.device_id = s.device_id
            WHERE s.device_id = $1
            ORDER BY s.sensor_id
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to query sensors on device {device_id}"))
    }
}

impl MeasurementStore for PgStore {
    async fn latest_timestamp_for_device(&self, device_id: &str) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            SELECT MAX(r.measured_at)
            FROM readings r
            JOIN sensors s ON s.sensor_id = r.sensor_id
            WHERE s.device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to query latest reading time for device {device_id}"))
    }

    async fn insert_readings(&self, readings: &[Reading]) -> Result<InsertSummary> {
        let inserted = bulk_insert_readings(&self.pool, readings)
            .await
            .context("failed to bulk insert readings")?;

        Ok(InsertSummary::from_attempt(readings.len(), inserted))
    }

    async fn last_reading_for_sensor(&self, sensor_id: i32) -> Result<Option<Reading>> {
        sqlx::query_as::<_, Reading>(
            r#"
            SELECT sensor_id, measured_at, temperature_celsius, humidity_percent, pressure_hpa, gas_resistance_ohm, soil_moisture_value, soil_moisture_volts
            FROM readings
            WHERE sensor_id = $1
            ORDER BY measured_at DESC
            LIMIT 1
            "#,
        )
        .bind(sensor_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to query last reading for sensor {sensor_id}"))
    }
}
