mod args;
mod csv;

use std::fs::File;

use anyhow::Context as _;
use args::Args;
use clap::Parser as _;
use home_pi_collector::db::{bulk_insert_devices, bulk_insert_sensors, new_pool};

use crate::csv::{read_devices, read_sensors};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let devices_file = File::open(&args.devices)
        .with_context(|| format!("failed to open file: {:?}", args.devices))?;
    let devices = read_devices(devices_file)
        .with_context(|| format!("failed to read devices from {:?}", args.devices))?;

    let sensors_file = File::open(&args.sensors)
        .with_context(|| format!("failed to open file: {:?}", args.sensors))?;
    let sensors = read_sensors(sensors_file)
        .with_context(|| format!("failed to read sensors from {:?}", args.sensors))?;

    let pool = new_pool(&args.database_url)
        .await
        .context("failed to connect to database")?;

    let inserted_devices = bulk_insert_devices(&pool, &devices)
        .await
        .context("failed to insert devices")?;
    let inserted_sensors = bulk_insert_sensors(&pool, &sensors)
        .await
        .context("failed to insert sensors")?;

    println!(
        "Inserted {inserted_devices} of {} devices and {inserted_sensors} of {} sensors",
        devices.len(),
        sensors.len()
    );

    Ok(())
}
