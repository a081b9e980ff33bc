mod args;

use std::{process::ExitCode, time::Duration};

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use home_pi_collector::{
    db::{PgStore, new_pool},
    fetch::FetchClient,
    poller::Poller,
};
use tokio::{signal, sync::watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let pool = new_pool(&args.database_url)
        .await
        .context("failed to connect to database")?;
    let store = PgStore::new(pool);

    let client = FetchClient::new(
        args.port,
        Duration::from_secs(args.timeout_secs),
        args.timezone,
    )
    .context("failed to create fetch client")?;

    let poller = Poller::new(
        store.clone(),
        store,
        client,
        Duration::from_secs(args.interval_secs),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested, finishing current device");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                error!("failed to listen for shutdown signal: {err:#}");
                // Dropping the sender would stop the loop.
                shutdown_tx.closed().await;
            }
        }
    });

    poller.run(shutdown_rx).await.context("ingestion loop failed")
}
