mod args;

use std::{
    io::{self, Write as _},
    pin::pin,
};

use anyhow::{Context as _, Result};
use args::Args;
use chrono::{TimeDelta, Utc};
use clap::Parser as _;
use home_pi_collector::{
    db::{PgStore, new_pool},
    pi::Reading,
    store::MeasurementStore as _,
};
use serde::Serialize;
use tokio_stream::StreamExt as _;

const MAX_DAYS: i64 = 100;

#[derive(Debug, Serialize)]
struct LatestReading<'a> {
    location: &'a str,
    device_name: &'a str,
    #[serde(flatten)]
    reading: &'a Reading,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let pool = new_pool(&args.database_url)
        .await
        .context("failed to connect to database")?;
    let store = PgStore::new(pool);

    match args.days {
        Some(days) => print_recent(&store, days.clamp(0, MAX_DAYS)).await,
        None => print_latest(&store).await,
    }
}

async fn print_latest(store: &PgStore) -> Result<()> {
    let mut out = io::stdout().lock();

    for sensor in store.sensors().await.context("failed to get sensors")? {
        let Some(reading) = store
            .last_reading_for_sensor(sensor.sensor_id)
            .await
            .with_context(|| format!("failed to get last reading for sensor {}", sensor.sensor_id))?
        else {
            continue;
        };

        let line = LatestReading {
            location: &sensor.location,
            device_name: &sensor.device_name,
            reading: &reading,
        };
        serde_json::to_writer(&mut out, &line).context("failed to write reading")?;
        writeln!(out).context("failed to write reading")?;
    }

    Ok(())
}

async fn print_recent(store: &PgStore, days: i64) -> Result<()> {
    let since = Utc::now() - TimeDelta::days(days);
    let mut out = io::stdout().lock();
    let mut total = 0;

    let mut readings = pin!(store.readings_since(since));
    while let Some(reading) = readings.next().await {
        let reading = reading?;
        serde_json::to_writer(&mut out, &reading).context("failed to write reading")?;
        writeln!(out).context("failed to write reading")?;
        total += 1;
    }

    eprintln!("{total} readings since {since}");

    Ok(())
}
