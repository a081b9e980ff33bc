use chrono_tz::Tz;
use clap::Parser;
use home_pi_collector::{
    fetch::{DEFAULT_PORT, DEFAULT_TIMEOUT},
    poller::DEFAULT_INTERVAL,
};

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Seconds to wait between polling cycles
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = DEFAULT_INTERVAL.as_secs())]
    pub interval_secs: u64,

    /// Port the agent on every device listens on
    #[arg(long, env = "PI_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Timeout for a single request to a device, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Timezone the devices expect the request cutoff in
    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,
}
